//! Inbound message envelope and property path helpers
//!
//! Messages are JSON objects. Properties are addressed with dotted paths and
//! array indices, e.g. `payload.readings[0].value`.

use super::error::InputError;
use serde_json::{Map, Value};

/// Largest timestamp magnitude in milliseconds (±100 million days around the epoch)
pub const MAX_TIMESTAMP_MS: f64 = 8.64e15;

/// A message as it entered the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub data: Value,
    /// Reception time in milliseconds since the Unix epoch
    pub received_at: i64,
}

impl InboundMessage {
    pub fn new(data: Value, received_at: i64) -> Self {
        Self { data, received_at }
    }

    /// Lower-cased topic; `None` when missing or blank
    pub fn topic(&self) -> Option<String> {
        let topic = match self.data.get("topic")? {
            Value::String(text) => text.trim().to_string(),
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            _ => return None,
        };

        if topic.is_empty() {
            None
        } else {
            Some(topic.to_lowercase())
        }
    }

    /// Raw command text; `None` when missing or blank
    pub fn command(&self) -> Option<&str> {
        self.data
            .get("command")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|command| !command.is_empty())
    }

    /// Numeric `timestamp` field carried by command messages
    pub fn timestamp_override(&self) -> Result<Option<i64>, InputError> {
        match self.data.get("timestamp").and_then(as_number) {
            Some(ts) => timestamp_ms(ts)
                .map(Some)
                .ok_or_else(|| InputError::OutOfRange("timestamp".to_string())),
            None => Ok(None),
        }
    }
}

/// Rounds a millisecond timestamp; `None` outside [`MAX_TIMESTAMP_MS`]
pub fn timestamp_ms(value: f64) -> Option<i64> {
    if value.is_finite() && value.abs() <= MAX_TIMESTAMP_MS {
        Some(value.round() as i64)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

/// Splits `a.b[2].c` into segments; `None` for malformed paths
fn parse_path(path: &str) -> Option<Vec<PathSegment>> {
    let mut segments = Vec::new();

    for part in path.trim().split('.') {
        if part.is_empty() {
            return None;
        }

        let (key, mut rest) = match part.find('[') {
            Some(bracket) => part.split_at(bracket),
            None => (part, ""),
        };
        if !key.is_empty() {
            segments.push(PathSegment::Key(key.to_string()));
        }

        while !rest.is_empty() {
            let close = rest.find(']')?;
            let index = rest[1..close].trim().parse::<usize>().ok()?;
            segments.push(PathSegment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return None;
            }
        }
    }

    Some(segments)
}

/// Looks up a property; an empty path returns the root
pub fn get_property<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.trim().is_empty() {
        return Some(root);
    }

    let mut current = root;
    for segment in parse_path(path)? {
        current = match segment {
            PathSegment::Key(key) => current.get(key.as_str())?,
            PathSegment::Index(index) => current.get(index)?,
        };
    }
    Some(current)
}

/// Sets a property, creating missing intermediate objects and arrays
///
/// Returns `false` when the path is empty or malformed, or when a primitive
/// value sits where a container is needed.
pub fn set_property(root: &mut Value, path: &str, value: Value) -> bool {
    let segments = match parse_path(path) {
        Some(segments) if !segments.is_empty() => segments,
        _ => return false,
    };
    let last = segments.len() - 1;

    let mut current = root;
    for (position, segment) in segments.iter().enumerate() {
        match segment {
            PathSegment::Key(key) => {
                if current.is_null() {
                    *current = Value::Object(Map::new());
                }
                let map = match current.as_object_mut() {
                    Some(map) => map,
                    None => return false,
                };
                if position == last {
                    map.insert(key.clone(), value);
                    return true;
                }
                current = map.entry(key.clone()).or_insert(Value::Null);
            }
            PathSegment::Index(index) => {
                if current.is_null() {
                    *current = Value::Array(Vec::new());
                }
                let items = match current.as_array_mut() {
                    Some(items) => items,
                    None => return false,
                };
                if items.len() <= *index {
                    items.resize(index + 1, Value::Null);
                }
                if position == last {
                    items[*index] = value;
                    return true;
                }
                current = &mut items[*index];
            }
        }
    }

    false
}

/// Interprets JSON numbers and numeric strings as finite `f64`
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|n| n.is_finite()),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            text.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

/// Random 16 hex digit message id
pub fn generate_id() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

/// Copies a message for output, giving it a fresh `_msgid` if it had one
pub fn clone_message(message: &Value) -> Value {
    let mut copy = message.clone();
    if let Some(map) = copy.as_object_mut() {
        if map.contains_key("_msgid") {
            map.insert("_msgid".to_string(), Value::String(generate_id()));
        }
    }
    copy
}
