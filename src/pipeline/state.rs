//! Per-topic state
//!
//! Each topic owns a [`Storage`] plus a short emission history that drives
//! change detection, the passthrough message for updates and the scheduler's
//! due-time calculation.

use super::action::{NodeStatus, Output, StatusFill, StatusShape};
use super::config::{Configuration, Precision};
use super::windows::Storage;
use serde_json::{Map, Number, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Topic state shared between the factory and the actions it creates
pub type SharedTopicState = Arc<Mutex<TopicState>>;

/// Locks a topic, recovering the state if a previous holder panicked
pub fn lock(state: &SharedTopicState) -> MutexGuard<'_, TopicState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What was last received and emitted for a topic
#[derive(Debug, Clone, Default)]
struct EmissionHistory {
    /// Newest sample timestamp
    last_event_at: Option<i64>,
    /// Query timestamp of the last generated output
    last_update_at: Option<i64>,
    input_value: Option<f64>,
    output_value: Option<f64>,
    /// Last sample message, reused by updates
    last_message: Option<Value>,
}

pub struct TopicState {
    config: Arc<Configuration>,
    storage: Storage,
    history: EmissionHistory,
    /// Zero-padded display id, e.g. `03`
    id: String,
}

impl TopicState {
    pub fn new(config: Arc<Configuration>) -> Self {
        let storage = Storage::new(
            config.slot_count,
            config.slot_resolution_ms,
            config.slot_method,
            config.storage_limits,
        );

        Self {
            config,
            storage,
            history: EmissionHistory::default(),
            id: String::new(),
        }
    }

    pub fn shared(config: Arc<Configuration>) -> SharedTopicState {
        Arc::new(Mutex::new(Self::new(config)))
    }

    /// Stores a sample and generates the output as of its timestamp
    pub fn add_sample(&mut self, value: f64, timestamp: i64, message: &Value) -> Output {
        self.storage.add_event(value, timestamp);

        self.history.last_event_at = Some(match self.history.last_event_at {
            Some(last) => last.max(timestamp),
            None => timestamp,
        });
        self.history.input_value = Some(value);
        self.history.last_message = Some(message.clone());

        self.generate_output(timestamp)
    }

    /// Recomputes the output for `timestamp` without adding an event
    pub fn generate_output(&mut self, timestamp: i64) -> Output {
        let config = Arc::clone(&self.config);

        let timestamp = match self.history.last_event_at {
            Some(last) if config.clamp_to_last_event && timestamp < last => last,
            _ => timestamp,
        };
        self.history.last_update_at = Some(timestamp);

        let coordinates = self.storage.get_coordinates(timestamp);
        if coordinates.is_empty() {
            return Output::default();
        }

        let series: Vec<f64> = config
            .interpolator
            .interpolate(&coordinates, config.slot_count)
            .into_iter()
            .flatten()
            .collect();
        if series.is_empty() {
            return Output::default();
        }

        let mut output_value = config.output_method.apply(&series);
        if let Precision::Digits(digits) = config.precision {
            output_value = round(output_value, digits);
        }

        let is_changed = self.history.output_value != Some(output_value);
        self.history.output_value = Some(output_value);

        let mut result = Output::default();

        if config.output1_frequency.should_emit(is_changed) {
            result.set_value("value", number_value(output_value));
        }

        if config.output2_frequency.should_emit(is_changed) {
            result.set_value("object", self.statistics(timestamp, output_value, &series));
        }

        result.set_status(NodeStatus::new(
            StatusFill::Green,
            if is_changed { StatusShape::Dot } else { StatusShape::Ring },
            format!(
                "[{}] {}+{} ⇒ {}",
                self.id,
                self.storage.event_count(),
                self.storage.history_count(),
                self.format(output_value)
            ),
        ));

        result
    }

    /// Forgets all events and the emission history
    pub fn clear(&mut self) {
        self.storage.clear();
        self.history = EmissionHistory::default();
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: String) {
        self.id = id;
    }

    pub fn last_message(&self) -> Option<&Value> {
        self.history.last_message.as_ref()
    }

    pub fn last_event_at(&self) -> Option<i64> {
        self.history.last_event_at
    }

    pub fn last_update_at(&self) -> Option<i64> {
        self.history.last_update_at
    }

    pub fn last_input(&self) -> Option<f64> {
        self.history.input_value
    }

    pub fn last_output(&self) -> Option<f64> {
        self.history.output_value
    }

    pub fn event_count(&self) -> usize {
        self.storage.event_count()
    }

    pub fn history_count(&self) -> usize {
        self.storage.history_count()
    }

    /// Object output: timestamp, method-keyed value and series statistics
    fn statistics(&self, timestamp: i64, output_value: f64, series: &[f64]) -> Value {
        let minimum = series.iter().copied().reduce(f64::min);
        let maximum = series.iter().copied().reduce(f64::max);

        let mut object = Map::new();
        object.insert("timestamp".to_string(), Value::from(timestamp));
        object.insert(self.config.output_method_code.clone(), number_value(output_value));
        object.insert(
            "value".to_string(),
            series.last().copied().map_or(Value::Null, number_value),
        );
        object.insert("minimum".to_string(), minimum.map_or(Value::Null, number_value));
        object.insert("maximum".to_string(), maximum.map_or(Value::Null, number_value));
        object.insert("count".to_string(), Value::from(self.storage.event_count()));
        Value::Object(object)
    }

    /// Formats a number for the status line
    fn format(&self, value: f64) -> String {
        let digits = match self.config.precision {
            Precision::Digits(digits) => digits as usize,
            Precision::Infinite => 10,
        };
        format_number(value, digits)
    }
}

/// JSON number, or null for NaN and infinities
pub fn number_value(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// Rounds half up on the decimal representation
///
/// Shifting through the string form avoids binary artifacts such as
/// `1.005 * 100 = 100.49999999999999`.
pub fn round(value: f64, digits: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let shifted = match format!("{}e{}", value, digits).parse::<f64>() {
        Ok(shifted) => (shifted + 0.5).floor(),
        Err(_) => return value,
    };
    format!("{}e-{}", shifted, digits).parse().unwrap_or(value)
}

/// Fixed-point formatting with trailing zeros removed
pub fn format_number(value: f64, max_fraction_digits: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let text = format!("{:.*}", max_fraction_digits, value);
    let text = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    };

    if text == "-0" {
        "0".to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::{Frequency, UserConfiguration};
    use serde_json::json;

    const MINUTE: i64 = 60_000;

    fn config(output2: Frequency) -> Arc<Configuration> {
        let mut config = Configuration::build(&UserConfiguration::default()).unwrap();
        config.slot_count = 4;
        config.output2_frequency = output2;
        Arc::new(config)
    }

    #[test]
    fn test_first_sample_emits() {
        // Test: the first sample is always a change
        let mut state = TopicState::new(config(Frequency::Never));
        state.set_id("01".to_string());

        let output = state.add_sample(5.0, 10 * MINUTE, &json!({"payload": 5}));
        assert_eq!(output.value("value"), Some(&json!(5.0)));
        assert!(!output.has_value("object"));

        let status = output.status().unwrap();
        assert_eq!(status.fill, StatusFill::Green);
        assert_eq!(status.shape, StatusShape::Dot);
        assert_eq!(status.text, "[01] 1+0 ⇒ 5");
    }

    #[test]
    fn test_identical_samples_suppressed() {
        // Test: same value in the same slot → second emission suppressed
        let mut state = TopicState::new(config(Frequency::Never));

        let first = state.add_sample(5.0, 10 * MINUTE, &json!({}));
        let second = state.add_sample(5.0, 10 * MINUTE + 1_000, &json!({}));

        assert!(first.has_value("value"));
        assert!(!second.has_value("value"));
        assert_eq!(second.status().unwrap().shape, StatusShape::Ring);
        assert_eq!(state.event_count(), 2);
    }

    #[test]
    fn test_object_output() {
        let mut state = TopicState::new(config(Frequency::Always));

        state.add_sample(2.0, 10 * MINUTE, &json!({}));
        let output = state.add_sample(6.0, 12 * MINUTE, &json!({}));

        // window 9..=12 min: [2, 2, 2, 6] with stepAfter
        let object = output.value("object").unwrap();
        assert_eq!(object["timestamp"], json!(12 * MINUTE));
        assert_eq!(object["mean"], json!(3.0));
        assert_eq!(object["value"], json!(6.0));
        assert_eq!(object["minimum"], json!(2.0));
        assert_eq!(object["maximum"], json!(6.0));
        assert_eq!(object["count"], json!(2));
    }

    #[test]
    fn test_query_clamped_to_last_event() {
        // Edge case: an update with an older timestamp cannot move the window back
        let mut state = TopicState::new(config(Frequency::Never));
        state.add_sample(4.0, 20 * MINUTE, &json!({}));

        state.generate_output(5 * MINUTE);
        assert_eq!(state.last_update_at(), Some(20 * MINUTE));
        assert_eq!(state.last_event_at(), Some(20 * MINUTE));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut state = TopicState::new(config(Frequency::Never));
        state.add_sample(4.0, 20 * MINUTE, &json!({"payload": 4}));
        state.clear();

        assert_eq!(state.event_count(), 0);
        assert_eq!(state.history_count(), 0);
        assert!(state.last_message().is_none());
        assert!(state.last_event_at().is_none());
        assert!(state.generate_output(21 * MINUTE).is_empty());

        // Next sample starts fresh and counts as a change again
        let output = state.add_sample(4.0, 30 * MINUTE, &json!({}));
        assert!(output.has_value("value"));
    }

    #[test]
    fn test_precision_rounding() {
        let mut config = Configuration::build(&UserConfiguration::default()).unwrap();
        config.precision = Precision::Digits(2);
        let mut state = TopicState::new(Arc::new(config));

        let output = state.add_sample(0.125, MINUTE, &json!({}));
        assert_eq!(output.value("value"), Some(&json!(0.13)));
        assert!(output.status().unwrap().text.ends_with("⇒ 0.13"));
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round(1.005, 2), 1.01);
        assert_eq!(round(2.5, 0), 3.0);
        assert_eq!(round(-2.5, 0), -2.0);
        assert_eq!(round(1.23456, 3), 1.235);
        assert!(round(f64::NAN, 2).is_nan());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0, 10), "5");
        assert_eq!(format_number(2.5, 10), "2.5");
        assert_eq!(format_number(1.0 / 3.0, 4), "0.3333");
        assert_eq!(format_number(-0.00001, 2), "0");
    }
}
