//! Error types for configuration, input resolution and output writing

use thiserror::Error;

/// Raised while turning raw user settings into a [`Configuration`](super::Configuration)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Raised while resolving the declared inputs of an action
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Value of \"{0}\" is missing.")]
    Missing(String),

    #[error("Value of \"{0}\" is not numeric.")]
    NotNumeric(String),

    #[error("Value of \"{0}\" is not a valid timestamp.")]
    OutOfRange(String),

    #[error("Failed to read \"{property}\": {reason}")]
    Lookup { property: String, reason: String },
}

/// Raised while writing the declared outputs of an action
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to set message property \"{0}\".")]
    MessageProperty(String),

    #[error("Failed to write \"{key}\" to {scope} context: {reason}")]
    ContextWrite {
        scope: String,
        key: String,
        reason: String,
    },
}

/// Any failure while a single message moves through the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("Pipeline stopped before the message completed")]
    Stopped,
}
