//! Boundary to the embedding runtime
//!
//! The pipeline never talks to the outside world directly. Context-store
//! reads and writes, message dispatch, status display and error reporting all
//! go through [`Host`]. [`MemoryHost`] keeps everything in memory and forwards
//! sent messages on a channel.

use super::action::NodeStatus;
use super::error::OutputError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{mpsc, RwLock};

/// Shared context scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextScope {
    Flow,
    Global,
}

impl ContextScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextScope::Flow => "flow",
            ContextScope::Global => "global",
        }
    }
}

/// Context property with an optional store prefix: `#:(store)::key`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextKey {
    pub store: Option<String>,
    pub key: String,
}

impl ContextKey {
    pub fn parse(property: &str) -> Self {
        let property = property.trim();

        if let Some(rest) = property.strip_prefix("#:(") {
            if let Some((store, key)) = rest.split_once(")::") {
                return Self {
                    store: Some(store.to_string()).filter(|store| !store.is_empty()),
                    key: key.to_string(),
                };
            }
        }

        Self {
            store: None,
            key: property.to_string(),
        }
    }
}

/// Services the pipeline needs from its runtime
#[async_trait]
pub trait Host: Send + Sync {
    /// Reads a context value; `Ok(None)` when the key is not set
    async fn read_context(
        &self,
        scope: ContextScope,
        key: &ContextKey,
    ) -> Result<Option<Value>, OutputError>;

    /// Writes a context value
    async fn write_context(
        &self,
        scope: ContextScope,
        key: &ContextKey,
        value: Value,
    ) -> Result<(), OutputError>;

    /// Dispatches one message slot per output channel
    async fn send(&self, outputs: Vec<Option<Value>>);

    /// Shows a status line for the node
    fn status(&self, status: NodeStatus);

    /// Reports a failed message
    fn error(&self, text: &str, message: &Value);
}

type ContextMap = HashMap<(ContextScope, Option<String>, String), Value>;

/// In-memory host used by the runtime binary and tests
pub struct MemoryHost {
    context: RwLock<ContextMap>,
    outbound: mpsc::Sender<Vec<Option<Value>>>,
    statuses: Mutex<Vec<NodeStatus>>,
    errors: Mutex<Vec<(String, Value)>>,
}

impl MemoryHost {
    /// Creates a host whose sent messages arrive on the returned receiver
    pub fn new(channel_buffer: usize) -> (Self, mpsc::Receiver<Vec<Option<Value>>>) {
        let (outbound, rx) = mpsc::channel(channel_buffer.max(1));
        let host = Self {
            context: RwLock::new(HashMap::new()),
            outbound,
            statuses: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        };
        (host, rx)
    }

    /// Seeds or inspects the context store directly
    pub async fn set_context(&self, scope: ContextScope, property: &str, value: Value) {
        let key = ContextKey::parse(property);
        self.context.write().await.insert((scope, key.store, key.key), value);
    }

    pub async fn get_context(&self, scope: ContextScope, property: &str) -> Option<Value> {
        let key = ContextKey::parse(property);
        self.context.read().await.get(&(scope, key.store, key.key)).cloned()
    }

    /// All status lines shown so far
    pub fn statuses(&self) -> Vec<NodeStatus> {
        self.statuses.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_status(&self) -> Option<NodeStatus> {
        self.statuses.lock().ok().and_then(|s| s.last().cloned())
    }

    /// All reported errors with the message that caused them
    pub fn errors(&self) -> Vec<(String, Value)> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Host for MemoryHost {
    async fn read_context(
        &self,
        scope: ContextScope,
        key: &ContextKey,
    ) -> Result<Option<Value>, OutputError> {
        let context = self.context.read().await;
        Ok(context.get(&(scope, key.store.clone(), key.key.clone())).cloned())
    }

    async fn write_context(
        &self,
        scope: ContextScope,
        key: &ContextKey,
        value: Value,
    ) -> Result<(), OutputError> {
        if key.key.trim().is_empty() {
            return Err(OutputError::ContextWrite {
                scope: scope.as_str().to_string(),
                key: key.key.clone(),
                reason: "empty key".to_string(),
            });
        }

        self.context
            .write()
            .await
            .insert((scope, key.store.clone(), key.key.clone()), value);
        Ok(())
    }

    async fn send(&self, outputs: Vec<Option<Value>>) {
        if let Err(e) = self.outbound.send(outputs).await {
            log::warn!("Outbound channel closed, dropping message: {}", e);
        }
    }

    fn status(&self, status: NodeStatus) {
        log::debug!("Status: {}", status.text);
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.push(status);
        }
    }

    fn error(&self, text: &str, message: &Value) {
        log::error!("{} (message: {})", text, message);
        if let Ok(mut errors) = self.errors.lock() {
            errors.push((text.to_string(), message.clone()));
        }
    }
}
