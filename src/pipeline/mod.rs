//! # Statistics pipeline
//!
//! ## Architecture
//!
//! ```text
//! inbound message
//!     ↓
//! MessageHandler (FIFO queue, one message in flight)
//!     ↓
//! ActionFactory::build()  → 0..N actions for the topic/command
//!     ↓
//! input resolution (msg / flow / global / date)
//!     ↓
//! Action::execute()  → TopicState (Storage → Interpolator → Reducer)
//!     ↓
//! output writes (flow / global) + per-channel messages (msg)
//!     ↓
//! Host::send() / Host::status() → completion
//! ```
//!
//! The update timer never touches topic state directly: it enqueues a tick,
//! and the tick enqueues synthetic `update` commands behind whatever is
//! already waiting.
//!
//! ## Module Organization
//!
//! - `windows` - Events, coordinates and the per-topic sliding window
//! - `reducer` - Statistical reducers selected by name
//! - `interpolation` - Gap-filling strategies
//! - `config` - Raw user configuration and the sanitized snapshot
//! - `action` - Action trait plus input/output contracts
//! - `state` - Per-topic state and output generation
//! - `actions` - Value, update and clear actions
//! - `engine` - Topic table and command routing
//! - `scheduler` - Periodic update timer
//! - `ingestion` - Ordered message processing
//! - `host` - Boundary to the embedding runtime
//! - `message` - Message envelope and property paths
//! - `error` - Error types

pub mod action;
pub mod actions;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod ingestion;
pub mod interpolation;
pub mod message;
pub mod reducer;
pub mod scheduler;
pub mod state;
pub mod windows;

// Re-export commonly used types
pub use action::{Action, NodeStatus, StatusFill, StatusShape};
pub use config::{Configuration, RuntimeConfig, UserConfiguration};
pub use engine::{ActionFactory, Dispatch};
pub use error::{ConfigError, InputError, OutputError, PipelineError};
pub use host::{Host, MemoryHost};
pub use ingestion::MessageHandler;
pub use interpolation::Interpolator;
pub use message::InboundMessage;
pub use reducer::Reducer;
pub use windows::{Coordinate, Event, Storage, StorageLimits};

use std::sync::Arc;

/// Millisecond clock used for reception timestamps and the update timer
///
/// Replaced in tests with a deterministic function.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Wall-clock milliseconds since the Unix epoch
pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}
