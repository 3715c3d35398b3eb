//! Value, update and clear actions
//!
//! All three operate on the [`TopicState`](super::state::TopicState) of one
//! topic. The value action feeds a new sample, the update action regenerates
//! the output without one, and the clear action wipes the topic.

use super::action::{
    Action, Input, InputDefinition, InputValueDefinition, NodeStatus, Output, OutputDefinition,
    OutputValueDefinition, StatusFill, StatusShape, ValueKind,
};
use super::config::Configuration;
use super::error::{InputError, PipelineError};
use super::message::timestamp_ms;
use super::state::{lock, SharedTopicState};
use serde_json::Value;
use std::sync::Arc;

/// Channel 0 carries the bare value, channel 1 the statistics object
fn output_definition(config: &Configuration, message: Option<Value>) -> OutputDefinition {
    let mut result = OutputDefinition::new();

    result.insert(
        "value".to_string(),
        OutputValueDefinition {
            target: config.output1_value.target,
            property: config.output1_value.property.clone(),
            channel: 0,
            message: message.clone(),
        },
    );
    result.insert(
        "object".to_string(),
        OutputValueDefinition {
            target: config.output2_value.target,
            property: config.output2_value.property.clone(),
            channel: 1,
            message,
        },
    );

    result
}

fn timestamp_input(config: &Configuration) -> InputValueDefinition {
    InputValueDefinition {
        source: config.input_timestamp.source,
        property: config.input_timestamp.property.clone(),
        kind: ValueKind::Number,
        required: false,
        default: None,
    }
}

/// Resolved timestamp input in milliseconds, if any
fn input_timestamp(input: &Input) -> Result<Option<i64>, InputError> {
    match input.optional_number("timestamp") {
        Some(ts) => timestamp_ms(ts)
            .map(Some)
            .ok_or_else(|| InputError::OutOfRange("timestamp".to_string())),
        None => Ok(None),
    }
}

/// Stores a sample for a topic and emits the new aggregate
pub struct ValueAction {
    config: Arc<Configuration>,
    state: SharedTopicState,
}

impl ValueAction {
    pub fn new(config: Arc<Configuration>, state: SharedTopicState) -> Self {
        Self { config, state }
    }
}

impl Action for ValueAction {
    fn define_input(&self) -> InputDefinition {
        let mut result = InputDefinition::new();

        result.insert(
            "value".to_string(),
            InputValueDefinition {
                source: self.config.input_value.source,
                property: self.config.input_value.property.clone(),
                kind: ValueKind::Number,
                required: true,
                default: None,
            },
        );
        result.insert("timestamp".to_string(), timestamp_input(&self.config));

        result
    }

    fn define_output(&self) -> OutputDefinition {
        output_definition(&self.config, None)
    }

    fn execute(&self, input: &Input) -> Result<Output, PipelineError> {
        let value = input.required_number("value")?;
        let timestamp = input_timestamp(input)?.unwrap_or(input.message().received_at);

        Ok(lock(&self.state).add_sample(value, timestamp, &input.message().data))
    }
}

/// Regenerates the output of a topic without adding a sample
pub struct UpdateAction {
    config: Arc<Configuration>,
    state: SharedTopicState,
}

impl UpdateAction {
    pub fn new(config: Arc<Configuration>, state: SharedTopicState) -> Self {
        Self { config, state }
    }
}

impl Action for UpdateAction {
    fn define_input(&self) -> InputDefinition {
        let mut result = InputDefinition::new();
        result.insert("timestamp".to_string(), timestamp_input(&self.config));
        result
    }

    /// Outputs are written into the topic's last sample message
    fn define_output(&self) -> OutputDefinition {
        let last_message = lock(&self.state).last_message().cloned();
        output_definition(&self.config, last_message)
    }

    fn execute(&self, input: &Input) -> Result<Output, PipelineError> {
        let message = input.message();
        let timestamp = match message.timestamp_override()? {
            Some(ts) => ts,
            None => input_timestamp(input)?.unwrap_or(message.received_at),
        };

        Ok(lock(&self.state).generate_output(timestamp))
    }
}

/// Wipes all events and history of a topic
pub struct ClearAction {
    state: SharedTopicState,
}

impl ClearAction {
    pub fn new(state: SharedTopicState) -> Self {
        Self { state }
    }
}

impl Action for ClearAction {
    fn define_input(&self) -> InputDefinition {
        InputDefinition::new()
    }

    fn define_output(&self) -> OutputDefinition {
        OutputDefinition::new()
    }

    fn execute(&self, _input: &Input) -> Result<Output, PipelineError> {
        let mut state = lock(&self.state);
        state.clear();

        let mut output = Output::default();
        output.set_status(NodeStatus::new(
            StatusFill::Yellow,
            StatusShape::Dot,
            format!("[{}] cleared", state.id()),
        ));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::{InputSource, OutputTarget, UserConfiguration};
    use crate::pipeline::error::InputError;
    use crate::pipeline::message::InboundMessage;
    use crate::pipeline::state::TopicState;
    use serde_json::json;
    use std::collections::HashMap;

    const MINUTE: i64 = 60_000;

    fn setup() -> (Arc<Configuration>, SharedTopicState) {
        let config = Arc::new(Configuration::build(&UserConfiguration::default()).unwrap());
        let state = TopicState::shared(Arc::clone(&config));
        lock(&state).set_id("01".to_string());
        (config, state)
    }

    fn input(values: Vec<(&str, Value)>, data: Value, received_at: i64) -> Input {
        let values: HashMap<String, Value> =
            values.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        Input::new(values, InboundMessage::new(data, received_at))
    }

    #[test]
    fn test_value_action_contract() {
        let (config, state) = setup();
        let action = ValueAction::new(config, state);

        let inputs = action.define_input();
        assert_eq!(inputs["value"].source, InputSource::Msg);
        assert_eq!(inputs["value"].property, "payload");
        assert!(inputs["value"].required);
        assert_eq!(inputs["timestamp"].source, InputSource::Date);
        assert!(!inputs["timestamp"].required);

        let outputs = action.define_output();
        assert_eq!(outputs["value"].channel, 0);
        assert_eq!(outputs["object"].channel, 1);
        assert_eq!(outputs["value"].target, OutputTarget::Msg);
        assert!(outputs["value"].message.is_none());
    }

    #[test]
    fn test_value_action_stores_sample() {
        // Test: timestamp falls back to the reception time
        let (config, state) = setup();
        let action = ValueAction::new(config, Arc::clone(&state));

        let output = action
            .execute(&input(vec![("value", json!(7))], json!({"payload": 7}), 3 * MINUTE))
            .unwrap();

        assert_eq!(output.value("value"), Some(&json!(7.0)));
        let state = lock(&state);
        assert_eq!(state.event_count(), 1);
        assert_eq!(state.last_event_at(), Some(3 * MINUTE));
        assert_eq!(state.last_message(), Some(&json!({"payload": 7})));
    }

    #[test]
    fn test_value_action_requires_value() {
        let (config, state) = setup();
        let action = ValueAction::new(config, state);

        let result = action.execute(&input(vec![], json!({}), MINUTE));
        assert!(matches!(result, Err(PipelineError::Input(InputError::Missing(_)))));
    }

    #[test]
    fn test_value_action_rejects_extreme_timestamp() {
        // Edge case: a finite timestamp far outside the date range is an input error
        let (config, state) = setup();
        let action = ValueAction::new(config, Arc::clone(&state));

        for ts in [json!(-1e30), json!(1e30)] {
            let result = action.execute(&input(
                vec![("value", json!(1)), ("timestamp", ts)],
                json!({"payload": 1}),
                MINUTE,
            ));
            assert!(matches!(result, Err(PipelineError::Input(InputError::OutOfRange(_)))));
        }
        assert_eq!(lock(&state).event_count(), 0);
    }

    #[test]
    fn test_update_action_uses_last_message() {
        // Test: update outputs are written into the last sample message
        let (config, state) = setup();
        let value = ValueAction::new(Arc::clone(&config), Arc::clone(&state));
        value
            .execute(&input(vec![("value", json!(3))], json!({"topic": "a", "payload": 3}), MINUTE))
            .unwrap();

        let update = UpdateAction::new(config, Arc::clone(&state));
        let outputs = update.define_output();
        assert_eq!(outputs["value"].message, Some(json!({"topic": "a", "payload": 3})));
        assert!(!update.define_input()["timestamp"].required);
    }

    #[test]
    fn test_update_action_prefers_message_timestamp() {
        let (config, state) = setup();
        lock(&state).add_sample(3.0, MINUTE, &json!({}));

        let update = UpdateAction::new(config, Arc::clone(&state));
        let data = json!({"topic": "a", "command": "update", "timestamp": 5 * MINUTE});
        let output = update
            .execute(&input(vec![("timestamp", json!(2 * MINUTE))], data, 9 * MINUTE))
            .unwrap();

        // Same value as before → no emission, status only
        assert!(!output.has_value("value"));
        assert!(output.status().is_some());
        assert_eq!(lock(&state).last_update_at(), Some(5 * MINUTE));
    }

    #[test]
    fn test_clear_action() {
        let (config, state) = setup();
        lock(&state).add_sample(3.0, MINUTE, &json!({}));

        let clear = ClearAction::new(Arc::clone(&state));
        assert!(clear.define_input().is_empty());
        assert!(clear.define_output().is_empty());

        let output = clear.execute(&input(vec![], json!({}), 2 * MINUTE)).unwrap();
        assert_eq!(output.status().unwrap().text, "[01] cleared");
        assert_eq!(output.status().unwrap().fill, StatusFill::Yellow);
        assert_eq!(lock(&state).event_count(), 0);
    }
}
