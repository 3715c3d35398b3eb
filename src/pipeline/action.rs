//! Action contract
//!
//! An action declares which values it needs (`define_input`), where its
//! results go (`define_output`) and turns resolved inputs into outputs
//! (`execute`). Resolving inputs and writing outputs is the job of the
//! [`MessageHandler`](super::MessageHandler); actions never touch the host.

use super::config::{InputSource, OutputTarget};
use super::error::{InputError, PipelineError};
use super::message::{as_number, InboundMessage};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Expected type of an input value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// JSON number or numeric string, normalized to a JSON number
    Number,
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputValueDefinition {
    pub source: InputSource,
    pub property: String,
    pub kind: ValueKind,
    pub required: bool,
    /// Used when the property cannot be found
    pub default: Option<Value>,
}

impl InputValueDefinition {
    /// Human-readable location, e.g. `msg.payload`
    pub fn location(&self) -> String {
        if self.property.trim().is_empty() {
            self.source.as_str().to_string()
        } else {
            format!("{}.{}", self.source.as_str(), self.property)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputValueDefinition {
    pub target: OutputTarget,
    pub property: String,
    /// Index of the output port
    pub channel: usize,
    /// Message the output is written into instead of the inbound one
    pub message: Option<Value>,
}

pub type InputDefinition = BTreeMap<String, InputValueDefinition>;
pub type OutputDefinition = BTreeMap<String, OutputValueDefinition>;

/// Resolved input values of one invocation
#[derive(Debug, Clone)]
pub struct Input {
    values: HashMap<String, Value>,
    message: InboundMessage,
}

impl Input {
    pub fn new(values: HashMap<String, Value>, message: InboundMessage) -> Self {
        Self { values, message }
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn required_number(&self, key: &str) -> Result<f64, InputError> {
        let value = self.values.get(key).ok_or_else(|| InputError::Missing(key.to_string()))?;
        as_number(value).ok_or_else(|| InputError::NotNumeric(key.to_string()))
    }

    pub fn optional_number(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(as_number)
    }

    pub fn message(&self) -> &InboundMessage {
        &self.message
    }
}

/// Values produced by one invocation plus an optional status line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Output {
    values: HashMap<String, Value>,
    status: Option<NodeStatus>,
}

impl Output {
    pub fn set_value(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn has_value(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.status.is_none()
    }

    pub fn set_status(&mut self, status: NodeStatus) {
        self.status = Some(status);
    }

    pub fn status(&self) -> Option<&NodeStatus> {
        self.status.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFill {
    Red,
    Green,
    Yellow,
    Blue,
    Grey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusShape {
    Dot,
    Ring,
}

/// Status line shown next to the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub fill: StatusFill,
    pub shape: StatusShape,
    pub text: String,
}

impl NodeStatus {
    pub fn new(fill: StatusFill, shape: StatusShape, text: impl Into<String>) -> Self {
        Self {
            fill,
            shape,
            text: text.into(),
        }
    }
}

/// A unit of work created for one inbound message
pub trait Action: Send + Sync {
    fn define_input(&self) -> InputDefinition;

    fn define_output(&self) -> OutputDefinition;

    fn execute(&self, input: &Input) -> Result<Output, PipelineError>;
}
