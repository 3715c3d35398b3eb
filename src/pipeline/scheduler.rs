//! Periodic update timer
//!
//! A single timer refreshes topics that stopped receiving samples. The timer
//! never touches topic state: when it fires it enqueues a [`QueueItem::Tick`]
//! and the message handler asks [`UpdateScheduler::on_tick`] which topics are
//! due. Due topics get a synthetic `update` command behind everything that is
//! already queued.
//!
//! Timing rules (all in milliseconds, `res` = slot resolution, `freq` = update
//! frequency):
//! - first firing: end of the current slot + `freq × res`
//! - a topic is due when `base + (freq + 1) × res ≤ start_of_slot(now)`,
//!   where `base` is the end of the last event's slot if no update happened
//!   since, otherwise the start of the last update's slot
//! - afterwards the timer rearms for the shortest remaining wait, or stops

use super::config::{Configuration, UpdateMode};
use super::ingestion::QueueItem;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

/// Scheduling facts about one topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicTiming {
    pub event_count: usize,
    pub last_event_at: Option<i64>,
    pub last_update_at: Option<i64>,
}

/// Result of evaluating all topics at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    /// Topics that need an update now
    pub due: Vec<String>,
    /// Delay until the next firing, `None` when nothing is pending
    pub next_delay: Option<i64>,
}

pub fn start_of_slot(timestamp: i64, resolution_ms: i64) -> i64 {
    timestamp.div_euclid(resolution_ms).saturating_mul(resolution_ms)
}

pub fn end_of_slot(timestamp: i64, resolution_ms: i64) -> i64 {
    let start = start_of_slot(timestamp, resolution_ms);
    if start == timestamp {
        start
    } else {
        start.saturating_add(resolution_ms)
    }
}

/// Decides which topics are due at `now` and when to fire next
pub fn plan(
    now: i64,
    resolution_ms: i64,
    frequency: i64,
    topics: &[(String, TopicTiming)],
) -> UpdatePlan {
    let start = start_of_slot(now, resolution_ms);
    let update_time = frequency.saturating_add(1).saturating_mul(resolution_ms);

    let mut due = Vec::new();
    let mut next_delay: Option<i64> = None;

    for (topic, timing) in topics {
        let (last_event_at, last_update_at) = match (timing.last_event_at, timing.last_update_at) {
            (Some(event), Some(update)) if timing.event_count > 0 => (event, update),
            // no current events
            _ => continue,
        };

        let base = if last_update_at < last_event_at {
            end_of_slot(last_event_at, resolution_ms)
        } else {
            start_of_slot(last_update_at, resolution_ms)
        };
        let next_update_at = base.saturating_add(update_time);

        if next_update_at <= start {
            due.push(topic.clone());
        } else {
            let wait = next_update_at.saturating_sub(now);
            next_delay = Some(next_delay.unwrap_or(update_time).min(wait));
        }
    }

    UpdatePlan { due, next_delay }
}

/// Owns the single update timer
pub struct UpdateScheduler {
    mode: UpdateMode,
    frequency: i64,
    resolution_ms: i64,
    timer: Option<JoinHandle<()>>,
    /// Incremented whenever the timer is armed or cancelled; ticks carry it
    generation: u64,
    queue: mpsc::UnboundedSender<QueueItem>,
}

impl UpdateScheduler {
    pub fn new(config: &Configuration, queue: mpsc::UnboundedSender<QueueItem>) -> Self {
        Self {
            mode: config.update_mode,
            frequency: config.update_frequency,
            resolution_ms: config.slot_resolution_ms,
            timer: None,
            generation: 0,
            queue,
        }
    }

    /// Starts the timer unless it is already running or updates are disabled
    pub fn schedule(&mut self, now: i64) {
        if self.timer.is_some() || self.mode == UpdateMode::Never {
            return;
        }

        let delay = end_of_slot(now, self.resolution_ms)
            .saturating_sub(now)
            .saturating_add(self.frequency.saturating_mul(self.resolution_ms));
        log::debug!("⏰ Update timer armed ({}ms)", delay);
        self.arm(delay);
    }

    /// Handles a firing; returns the topics that need an update
    ///
    /// Ticks from a cancelled or replaced timer are ignored.
    pub fn on_tick(
        &mut self,
        generation: u64,
        now: i64,
        topics: &[(String, TopicTiming)],
    ) -> Vec<String> {
        if generation != self.generation {
            log::debug!("⏰ Ignoring stale update tick");
            return Vec::new();
        }
        // the task that sent this tick has finished
        self.timer = None;

        let plan = plan(now, self.resolution_ms, self.frequency, topics);
        match plan.next_delay {
            Some(delay) => {
                log::debug!("⏰ {} topic(s) due, next check in {}ms", plan.due.len(), delay);
                self.arm(delay);
            }
            None => log::debug!("⏰ {} topic(s) due, timer stopped", plan.due.len()),
        }

        plan.due
    }

    /// Stops a pending timer
    pub fn cancel(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
            log::debug!("⏰ Update timer cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    fn arm(&mut self, delay_ms: i64) {
        self.cancel();

        let queue = self.queue.clone();
        let generation = self.generation;
        let delay = Duration::from_millis(delay_ms.max(0) as u64);
        self.timer = Some(tokio::spawn(async move {
            sleep(delay).await;
            if queue.send(QueueItem::Tick(generation)).is_err() {
                log::debug!("Message queue closed, dropping update tick");
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::UserConfiguration;

    const RES: i64 = 1_000;

    fn timing(event_count: usize, last_event_at: i64, last_update_at: i64) -> TopicTiming {
        TopicTiming {
            event_count,
            last_event_at: Some(last_event_at),
            last_update_at: Some(last_update_at),
        }
    }

    #[test]
    fn test_slot_bounds() {
        assert_eq!(start_of_slot(2_500, RES), 2_000);
        assert_eq!(end_of_slot(2_500, RES), 3_000);
        // Edge case: exact boundary is both start and end
        assert_eq!(end_of_slot(3_000, RES), 3_000);
    }

    #[test]
    fn test_plan_saturates_at_extreme_timestamps() {
        // Edge case: a topic whose last event sits at the i64 limit never overflows
        assert_eq!(end_of_slot(i64::MAX, RES), i64::MAX);
        let topics = vec![("a".to_string(), timing(1, i64::MAX, 0))];
        let plan = plan(1_000, RES, 5, &topics);
        assert!(plan.due.is_empty());
        assert_eq!(plan.next_delay, Some(6 * RES));
    }

    #[test]
    fn test_topic_due_after_idle_slots() {
        // Test: frequency 1 → due two slots after the last update's slot
        let topics = vec![("a".to_string(), timing(1, 10_200, 10_300))];

        let early = plan(11_500, RES, 1, &topics);
        assert!(early.due.is_empty());
        assert_eq!(early.next_delay, Some(500));

        let late = plan(12_000, RES, 1, &topics);
        assert_eq!(late.due, vec!["a".to_string()]);
        assert_eq!(late.next_delay, None);
    }

    #[test]
    fn test_event_newer_than_update_uses_end_of_slot() {
        let topics = vec![("a".to_string(), timing(1, 10_200, 9_000))];
        // base = 11_000, next = 12_000
        assert!(plan(11_999, RES, 0, &topics).due.is_empty());
        assert_eq!(plan(12_000, RES, 0, &topics).due, vec!["a".to_string()]);
    }

    #[test]
    fn test_topics_without_events_are_skipped() {
        let topics = vec![
            ("empty".to_string(), timing(0, 1_000, 1_000)),
            (
                "never".to_string(),
                TopicTiming {
                    event_count: 3,
                    last_event_at: None,
                    last_update_at: None,
                },
            ),
        ];
        assert_eq!(
            plan(100_000, RES, 0, &topics),
            UpdatePlan {
                due: vec![],
                next_delay: None
            }
        );
    }

    #[test]
    fn test_shortest_wait_wins() {
        let topics = vec![
            ("a".to_string(), timing(1, 10_000, 10_000)),
            ("b".to_string(), timing(1, 11_000, 11_000)),
            ("c".to_string(), timing(1, 5_000, 5_000)),
        ];
        let plan = plan(11_200, RES, 2, &topics);
        assert_eq!(plan.due, vec!["c".to_string()]);
        // a: 13_000 - 11_200
        assert_eq!(plan.next_delay, Some(1_800));
    }

    #[tokio::test]
    async fn test_schedule_respects_mode() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = Configuration::build(&UserConfiguration {
            update_mode: Some("never".to_string()),
            ..Default::default()
        })
        .unwrap();
        let mut scheduler = UpdateScheduler::new(&config, tx);

        scheduler.schedule(1_000);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_tick() {
        // Test: an armed timer enqueues a tick after the delay
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = Configuration::build(&UserConfiguration {
            update_mode: Some("periodic".to_string()),
            update_frequency: Some(1),
            slot_resolution_number: Some(1.0),
            slot_resolution_unit: Some("seconds".to_string()),
            ..Default::default()
        })
        .unwrap();
        let mut scheduler = UpdateScheduler::new(&config, tx);

        scheduler.schedule(10_400);
        assert!(scheduler.is_armed());
        // already armed → no second timer
        scheduler.schedule(10_500);

        let generation = match rx.recv().await {
            Some(QueueItem::Tick(generation)) => generation,
            _ => panic!("expected a tick"),
        };
        assert!(scheduler.on_tick(generation, 12_000, &[]).is_empty());
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut config = Configuration::build(&UserConfiguration::default()).unwrap();
        config.update_mode = UpdateMode::Periodic;
        let mut scheduler = UpdateScheduler::new(&config, tx);

        scheduler.schedule(0);
        scheduler.cancel();
        assert!(!scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_tick_is_ignored() {
        // Edge case: a tick queued before the timer was replaced does nothing
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut config = Configuration::build(&UserConfiguration::default()).unwrap();
        config.update_mode = UpdateMode::Periodic;
        let mut scheduler = UpdateScheduler::new(&config, tx);

        scheduler.schedule(0);
        let stale = scheduler.generation;
        scheduler.cancel();
        scheduler.schedule(0);

        let topics = vec![("a".to_string(), timing(1, 0, 0))];
        assert!(scheduler.on_tick(stale, 10_000_000, &topics).is_empty());
        assert!(scheduler.is_armed());
    }
}
