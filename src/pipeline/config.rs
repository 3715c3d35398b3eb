//! Node configuration
//!
//! [`UserConfiguration`] is the raw, loosely typed input (as stored by an
//! editor or read from a JSON file). [`Configuration::build`] validates it,
//! applies defaults and resolves every named strategy once, producing the
//! immutable snapshot shared by all topics.

use super::error::ConfigError;
use super::interpolation::Interpolator;
use super::message::MAX_TIMESTAMP_MS;
use super::reducer::Reducer;
use super::windows::StorageLimits;
use serde::Deserialize;
use std::env;
use std::path::Path;

/// Upper bound for `slotCount`
pub const MAX_SLOT_COUNT: usize = 100_000;

/// Raw node settings; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserConfiguration {
    pub output_method: Option<String>,
    pub slot_count: Option<i64>,
    pub slot_resolution_number: Option<f64>,
    pub slot_resolution_unit: Option<String>,
    pub slot_method: Option<String>,
    pub interpolation: Option<String>,
    pub precision: Option<String>,
    pub output1_frequency: Option<String>,
    pub output2_frequency: Option<String>,
    pub input_value_source: Option<String>,
    pub input_value_property: Option<String>,
    pub input_timestamp_source: Option<String>,
    pub input_timestamp_property: Option<String>,
    pub output1_value_target: Option<String>,
    pub output1_value_property: Option<String>,
    pub output2_value_target: Option<String>,
    pub output2_value_property: Option<String>,
    pub update_mode: Option<String>,
    pub update_frequency: Option<i64>,
}

impl UserConfiguration {
    /// Reads a JSON document with camelCase keys
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// When an output channel emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Always,
    Changes,
    Never,
}

impl Frequency {
    fn parse(name: &str, field: &str) -> Result<Self, ConfigError> {
        match name.to_lowercase().as_str() {
            "always" => Ok(Frequency::Always),
            "changes" => Ok(Frequency::Changes),
            "never" => Ok(Frequency::Never),
            other => Err(ConfigError::InvalidValue(format!(
                "{} must be always, changes or never, got '{}'",
                field, other
            ))),
        }
    }

    /// Whether a value should be emitted given the change state
    pub fn should_emit(&self, is_changed: bool) -> bool {
        match self {
            Frequency::Always => true,
            Frequency::Changes => is_changed,
            Frequency::Never => false,
        }
    }
}

/// Number of decimal places kept in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Infinite,
    Digits(u32),
}

impl Precision {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        if value.eq_ignore_ascii_case("infinite") {
            return Ok(Precision::Infinite);
        }

        match value.trim().parse::<u32>() {
            Ok(digits) if digits <= 15 => Ok(Precision::Digits(digits)),
            _ => Err(ConfigError::InvalidValue(format!(
                "precision must be 'infinite' or 0-15 digits, got '{}'",
                value
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Never,
    Periodic,
}

/// Where an input value is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    /// Property of the inbound message
    Msg,
    Flow,
    Global,
    /// Reception time of the inbound message
    Date,
}

impl InputSource {
    fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.to_lowercase().as_str() {
            "msg" => Ok(InputSource::Msg),
            "flow" => Ok(InputSource::Flow),
            "global" => Ok(InputSource::Global),
            "date" => Ok(InputSource::Date),
            other => Err(ConfigError::InvalidValue(format!(
                "unknown input source '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputSource::Msg => "msg",
            InputSource::Flow => "flow",
            InputSource::Global => "global",
            InputSource::Date => "date",
        }
    }
}

/// Where an output value is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    Msg,
    Flow,
    Global,
}

impl OutputTarget {
    fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.to_lowercase().as_str() {
            "msg" => Ok(OutputTarget::Msg),
            "flow" => Ok(OutputTarget::Flow),
            "global" => Ok(OutputTarget::Global),
            other => Err(ConfigError::InvalidValue(format!(
                "unknown output target '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputTarget::Msg => "msg",
            OutputTarget::Flow => "flow",
            OutputTarget::Global => "global",
        }
    }
}

/// Source object plus property path of an input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLocation {
    pub source: InputSource,
    pub property: String,
}

/// Target object plus property path of an output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLocation {
    pub target: OutputTarget,
    pub property: String,
}

/// Sanitized, immutable node configuration
#[derive(Debug, Clone)]
pub struct Configuration {
    pub output_method: Reducer,
    /// Name under which the output value appears in the object output
    pub output_method_code: String,
    pub slot_method: Reducer,
    pub slot_count: usize,
    pub slot_resolution_ms: i64,
    pub interpolator: Interpolator,
    pub precision: Precision,
    pub output1_frequency: Frequency,
    pub output2_frequency: Frequency,
    pub input_value: InputLocation,
    pub input_timestamp: InputLocation,
    pub output1_value: OutputLocation,
    pub output2_value: OutputLocation,
    pub update_mode: UpdateMode,
    /// Idle slots to wait before a topic is refreshed
    pub update_frequency: i64,
    pub storage_limits: StorageLimits,
    /// Never query a window earlier than the newest sample of a topic
    pub clamp_to_last_event: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            output_method: Reducer::Mean,
            output_method_code: "mean".to_string(),
            slot_method: Reducer::Mean,
            slot_count: 15,
            slot_resolution_ms: 60_000,
            interpolator: Interpolator::StepAfter,
            precision: Precision::Infinite,
            output1_frequency: Frequency::Changes,
            output2_frequency: Frequency::Never,
            input_value: InputLocation {
                source: InputSource::Msg,
                property: "payload".to_string(),
            },
            input_timestamp: InputLocation {
                source: InputSource::Date,
                property: String::new(),
            },
            output1_value: OutputLocation {
                target: OutputTarget::Msg,
                property: "payload".to_string(),
            },
            output2_value: OutputLocation {
                target: OutputTarget::Msg,
                property: "payload".to_string(),
            },
            update_mode: UpdateMode::Periodic,
            update_frequency: 5,
            storage_limits: StorageLimits::default(),
            clamp_to_last_event: true,
        }
    }
}

/// Returns the trimmed value or the default when missing or blank
fn text_or(value: &Option<String>, default: &str) -> String {
    match value {
        Some(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => default.to_string(),
    }
}

impl Configuration {
    /// Validates raw settings and fills in defaults
    pub fn build(user: &UserConfiguration) -> Result<Self, ConfigError> {
        let defaults = Configuration::default();

        let slot_count = match user.slot_count {
            None | Some(0) => defaults.slot_count,
            Some(count) if count > 0 && count as u64 <= MAX_SLOT_COUNT as u64 => count as usize,
            Some(count) => {
                return Err(ConfigError::InvalidValue(format!(
                    "slotCount must be between 1 and {}, got {}",
                    MAX_SLOT_COUNT, count
                )));
            }
        };

        let resolution_number = match user.slot_resolution_number {
            None => 1.0,
            Some(number) if number == 0.0 => 1.0,
            Some(number) if number.is_finite() && number > 0.0 => number,
            Some(number) => {
                return Err(ConfigError::InvalidValue(format!(
                    "slotResolutionNumber must be positive, got {}",
                    number
                )));
            }
        };
        let unit_ms = match text_or(&user.slot_resolution_unit, "minutes").to_lowercase().as_str() {
            "seconds" => 1_000.0,
            "minutes" => 60_000.0,
            "hours" => 3_600_000.0,
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "slotResolutionUnit must be seconds, minutes or hours, got '{}'",
                    other
                )));
            }
        };
        let resolution_ms = (resolution_number * unit_ms).round();
        if resolution_ms < 1.0 {
            return Err(ConfigError::InvalidValue(
                "slot resolution is below one millisecond".to_string(),
            ));
        }
        if resolution_ms > MAX_TIMESTAMP_MS {
            return Err(ConfigError::InvalidValue(format!(
                "slot resolution of {}ms is out of range",
                resolution_ms
            )));
        }
        let slot_resolution_ms = resolution_ms as i64;

        let output_method_code = text_or(&user.output_method, "mean");
        let update_mode = match text_or(&user.update_mode, "events").to_lowercase().as_str() {
            "never" => UpdateMode::Never,
            "events" | "periodic" | "active" => UpdateMode::Periodic,
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "updateMode must be never, events or periodic, got '{}'",
                    other
                )));
            }
        };
        let update_frequency = match user.update_frequency {
            None => defaults.update_frequency,
            Some(frequency) if frequency >= 0 => frequency,
            Some(frequency) => {
                return Err(ConfigError::InvalidValue(format!(
                    "updateFrequency must not be negative, got {}",
                    frequency
                )));
            }
        };

        Ok(Self {
            output_method: Reducer::from_name(&output_method_code),
            output_method_code,
            slot_method: Reducer::from_name(&text_or(&user.slot_method, "mean")),
            slot_count,
            slot_resolution_ms,
            interpolator: Interpolator::from_name(&text_or(&user.interpolation, "stepAfter")),
            precision: Precision::parse(&text_or(&user.precision, "infinite"))?,
            output1_frequency: Frequency::parse(
                &text_or(&user.output1_frequency, "changes"),
                "output1Frequency",
            )?,
            output2_frequency: Frequency::parse(
                &text_or(&user.output2_frequency, "never"),
                "output2Frequency",
            )?,
            input_value: InputLocation {
                source: InputSource::parse(&text_or(&user.input_value_source, "msg"))?,
                property: text_or(&user.input_value_property, "payload"),
            },
            input_timestamp: InputLocation {
                source: InputSource::parse(&text_or(&user.input_timestamp_source, "date"))?,
                property: text_or(&user.input_timestamp_property, ""),
            },
            output1_value: OutputLocation {
                target: OutputTarget::parse(&text_or(&user.output1_value_target, "msg"))?,
                property: text_or(&user.output1_value_property, "payload"),
            },
            output2_value: OutputLocation {
                target: OutputTarget::parse(&text_or(&user.output2_value_target, "msg"))?,
                property: text_or(&user.output2_value_property, "payload"),
            },
            update_mode,
            update_frequency,
            storage_limits: defaults.storage_limits,
            clamp_to_last_event: defaults.clamp_to_last_event,
        })
    }

    /// Short human-readable summary, e.g. `mean over 15 × 60000ms (stepAfter)`
    pub fn describe(&self) -> String {
        format!(
            "{} over {} × {}ms ({:?})",
            self.output_method_code, self.slot_count, self.slot_resolution_ms, self.interpolator
        )
    }
}

/// Configuration for the runtime binary
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Path to a JSON [`UserConfiguration`]; defaults apply when unset
    pub config_path: Option<String>,

    /// Buffer size of the outbound message channel
    pub channel_buffer: usize,

    pub rust_log: String,
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `STATISTICS_CONFIG` (default: unset)
    /// - `STATISTICS_CHANNEL_BUFFER` (default: 1000)
    /// - `RUST_LOG` (default: info)
    pub fn from_env() -> Self {
        Self {
            config_path: env::var("STATISTICS_CONFIG").ok().filter(|path| !path.trim().is_empty()),

            channel_buffer: env::var("STATISTICS_CHANNEL_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|buffer: &usize| *buffer > 0)
                .unwrap_or(1_000),

            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Builds the node configuration from the configured file, or defaults
    pub fn load_configuration(&self) -> Result<Configuration, ConfigError> {
        let user = match &self.config_path {
            Some(path) => UserConfiguration::from_file(path)?,
            None => UserConfiguration::default(),
        };
        Configuration::build(&user)
    }
}
