//! Sliding window of time-bucketed events
//!
//! Every event is assigned to a slot (`floor(timestamp / resolution) * resolution`).
//! A query timestamp defines the window of the `number_of_slots` most recent
//! slots; events older than the window move into a short history so that
//! interpolators can still see the value just before the window's left edge.

use super::reducer::Reducer;

/// A single stored sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub value: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Start of the slot the timestamp falls into
    pub slot: i64,
}

/// One reduced slot, positioned relative to the window start
///
/// `x` is negative for slots taken from the history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub x: i64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: i64, y: f64) -> Self {
        Self { x, y }
    }
}

/// History retention tuning
///
/// When the history holds more than `trim_threshold` raw events it is cut
/// down to the events of the `slots_kept` most recent distinct slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLimits {
    pub trim_threshold: usize,
    pub slots_kept: usize,
}

impl Default for StorageLimits {
    fn default() -> Self {
        Self {
            trim_threshold: 5,
            slots_kept: 3,
        }
    }
}

/// Calculates the slot for the given timestamp
pub fn slot_of(timestamp: i64, resolution_ms: i64) -> i64 {
    timestamp.div_euclid(resolution_ms).saturating_mul(resolution_ms)
}

/// Per-topic event store
#[derive(Debug, Clone)]
pub struct Storage {
    /// Events inside (or ahead of) the current window
    events: Vec<Event>,
    /// Events evicted from the window, kept for continuity at the left edge
    history: Vec<Event>,
    /// Set when an event arrived out of order; forces a sort before the next read
    is_unsorted: bool,
    number_of_slots: usize,
    resolution_ms: i64,
    reducer: Reducer,
    limits: StorageLimits,
}

impl Storage {
    pub fn new(
        number_of_slots: usize,
        resolution_ms: i64,
        reducer: Reducer,
        limits: StorageLimits,
    ) -> Self {
        Self {
            events: Vec::with_capacity(number_of_slots),
            history: Vec::new(),
            is_unsorted: false,
            number_of_slots: number_of_slots.max(1),
            resolution_ms: resolution_ms.max(1),
            reducer,
            limits,
        }
    }

    /// Appends an event with the given value and timestamp
    pub fn add_event(&mut self, value: f64, timestamp: i64) {
        let slot = slot_of(timestamp, self.resolution_ms);

        if let Some(last) = self.events.last() {
            if slot < last.slot {
                self.is_unsorted = true;
            }
        }

        self.events.push(Event {
            value,
            timestamp,
            slot,
        });
    }

    /// Generates coordinates for the window ending in the slot of `timestamp`
    ///
    /// History-derived coordinates come first, followed by the coordinates of
    /// the current events. Both groups are ordered by slot.
    pub fn get_coordinates(&mut self, timestamp: i64) -> Vec<Coordinate> {
        let first_slot = self.first_slot(timestamp);
        self.prepare_events(first_slot);

        let mut result = self.build_coordinates(first_slot, &self.history);
        result.extend(self.build_coordinates(first_slot, &self.events));
        result
    }

    /// Number of events in the current window
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Number of events in the history
    pub fn history_count(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.history.is_empty()
    }

    /// Removes all events and the history
    pub fn clear(&mut self) {
        self.events.clear();
        self.history.clear();
        self.is_unsorted = false;
    }

    pub fn number_of_slots(&self) -> usize {
        self.number_of_slots
    }

    pub fn resolution_ms(&self) -> i64 {
        self.resolution_ms
    }

    fn first_slot(&self, timestamp: i64) -> i64 {
        let last_slot = slot_of(timestamp, self.resolution_ms);
        let span = (self.number_of_slots as i64 - 1).saturating_mul(self.resolution_ms);
        last_slot.saturating_sub(span)
    }

    /// Sorts pending out-of-order events and moves old events to the history
    fn prepare_events(&mut self, first_slot: i64) {
        if self.is_unsorted {
            // Vec::sort_by_key is stable: equal timestamps keep arrival order
            self.events.sort_by_key(|event| event.timestamp);
            self.is_unsorted = false;
        }

        let expired = self
            .events
            .iter()
            .take_while(|event| event.timestamp < first_slot)
            .count();
        if expired > 0 {
            // late events may belong before slots that are already in the history
            let is_late = match (self.history.last(), self.events.first()) {
                (Some(last), Some(first)) => first.timestamp < last.timestamp,
                _ => false,
            };
            self.history.extend(self.events.drain(..expired));
            if is_late {
                self.history.sort_by_key(|event| event.timestamp);
            }
        }

        if self.history.len() > self.limits.trim_threshold {
            self.trim_history();
        }
    }

    /// Keeps only the events of the most recent distinct history slots
    fn trim_history(&mut self) {
        let mut distinct_slots = 0;
        let mut current_slot: Option<i64> = None;
        let mut start_index = self.history.len();

        for (index, event) in self.history.iter().enumerate().rev() {
            if current_slot != Some(event.slot) {
                distinct_slots += 1;
                current_slot = Some(event.slot);
            }
            if distinct_slots > self.limits.slots_kept {
                break;
            }
            start_index = index;
        }

        if start_index > 0 {
            self.history.drain(..start_index);
        }
    }

    /// Collapses consecutive events sharing a slot into one coordinate
    fn build_coordinates(&self, first_slot: i64, events: &[Event]) -> Vec<Coordinate> {
        let mut result = Vec::new();
        let mut index = 0;

        while index < events.len() {
            let slot = events[index].slot;
            let group_len = events[index..]
                .iter()
                .take_while(|event| event.slot == slot)
                .count();
            let group = &events[index..index + group_len];

            let y = if group.len() == 1 {
                group[0].value
            } else {
                let values: Vec<f64> = group.iter().map(|event| event.value).collect();
                self.reducer.apply(&values)
            };

            result.push(Coordinate {
                x: slot.saturating_sub(first_slot) / self.resolution_ms,
                y,
            });
            index += group_len;
        }

        result
    }
}
