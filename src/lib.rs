//! # slotstat
//!
//! Per-topic sliding-window statistics.
//!
//! Numeric samples arrive as messages keyed by `topic`. Each topic keeps a
//! window of time-bucketed events ("slots"), reduces every slot to a single
//! value, fills gaps with a configurable interpolator and emits an aggregate
//! whenever it changes. Out-of-band commands (`update`, `updateAll`, `clear`,
//! `clearAll`) and a self-rearming timer drive refreshes.
//!
//! All work flows through [`pipeline::MessageHandler`], which processes one
//! message at a time in arrival order.

pub mod pipeline;

pub use pipeline::{
    Configuration, Host, MemoryHost, MessageHandler, NodeStatus, PipelineError, UserConfiguration,
};
