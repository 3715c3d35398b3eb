//! Ordered message processing
//!
//! [`MessageHandler`] owns a FIFO queue and a single worker task. Exactly one
//! message is in flight at a time: its inputs are resolved, its actions run,
//! outputs are written and messages sent before the next message is taken
//! from the queue. A message that fans out to several actions runs them
//! concurrently and completes once all of them have finished.
//!
//! Failures never stall the queue. The first error of a message is logged,
//! reported to the host, shown as a red status and delivered on the
//! message's completion channel; processing continues with the next message.

use super::action::{
    Action, Input, InputDefinition, InputValueDefinition, NodeStatus, Output, OutputDefinition,
    StatusFill, StatusShape, ValueKind,
};
use super::config::{Configuration, InputSource, OutputTarget};
use super::engine::{ActionFactory, Dispatch};
use super::error::{InputError, OutputError, PipelineError};
use super::host::{ContextKey, ContextScope, Host};
use super::message::{as_number, clone_message, get_property, set_property, InboundMessage};
use super::scheduler::UpdateScheduler;
use super::state::number_value;
use super::{system_clock, Clock};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Work items of the message queue
pub enum QueueItem {
    Message {
        message: InboundMessage,
        done: Option<oneshot::Sender<Result<(), PipelineError>>>,
    },
    /// Update timer fired; carries the timer generation
    Tick(u64),
    Shutdown,
}

/// Resolves once the message has been fully processed
pub type Completion = oneshot::Receiver<Result<(), PipelineError>>;

pub struct MessageHandler {
    queue: mpsc::UnboundedSender<QueueItem>,
    worker: Option<JoinHandle<()>>,
    now_fn: Clock,
    busy: Arc<AtomicBool>,
}

impl MessageHandler {
    /// Starts the worker task using the system clock
    pub fn start(config: Configuration, host: Arc<dyn Host>) -> Self {
        Self::start_with_clock(config, host, system_clock())
    }

    /// Starts the worker task with a custom millisecond clock
    pub fn start_with_clock(config: Configuration, host: Arc<dyn Host>, now_fn: Clock) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let busy = Arc::new(AtomicBool::new(false));

        log::info!("🚀 Starting statistics pipeline: {}", config.describe());

        let config = Arc::new(config);
        let scheduler = UpdateScheduler::new(&config, queue.clone());
        let factory = ActionFactory::new(config, scheduler);
        host.status(factory.setup());

        let worker = Worker {
            factory,
            host,
            now_fn: now_fn.clone(),
            busy: Arc::clone(&busy),
            queue: queue.clone(),
        };

        Self {
            queue,
            worker: Some(tokio::spawn(worker.run(rx))),
            now_fn,
            busy,
        }
    }

    /// Queues a message; the receiver resolves when it has been processed
    pub fn handle(&self, data: Value) -> Completion {
        let (done, completion) = oneshot::channel();
        let message = InboundMessage::new(data, (self.now_fn)());

        if let Err(mpsc::error::SendError(item)) = self.queue.send(QueueItem::Message {
            message,
            done: Some(done),
        }) {
            log::warn!("⚠️  Message handler stopped, rejecting message");
            if let QueueItem::Message { done: Some(done), .. } = item {
                let _ = done.send(Err(PipelineError::Stopped));
            }
        }

        completion
    }

    /// Whether a message is currently in flight
    pub fn is_processing(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Processes everything already queued, stops the timer and waits for the worker
    pub async fn shutdown(mut self) {
        let _ = self.queue.send(QueueItem::Shutdown);
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                log::error!("❌ Message handler worker failed: {}", e);
            }
        }
    }
}

impl Drop for MessageHandler {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.queue.send(QueueItem::Shutdown);
        }
    }
}

struct Worker {
    factory: ActionFactory,
    host: Arc<dyn Host>,
    now_fn: Clock,
    busy: Arc<AtomicBool>,
    /// Feeds synthetic update commands back into the queue
    queue: mpsc::UnboundedSender<QueueItem>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<QueueItem>) {
        let mut processed = 0u64;

        while let Some(item) = rx.recv().await {
            match item {
                QueueItem::Message { message, done } => {
                    self.busy.store(true, Ordering::SeqCst);

                    let result = self.process(&message).await;
                    if let Err(e) = &result {
                        self.report(&message, e);
                    }
                    if let Some(done) = done {
                        if done.send(result).is_err() {
                            log::debug!("Completion receiver dropped");
                        }
                    }

                    processed += 1;
                    self.busy.store(false, Ordering::SeqCst);
                }
                QueueItem::Tick(generation) => {
                    let now = (self.now_fn)();
                    for data in self.factory.execute_update(generation, now) {
                        let message = InboundMessage::new(data, now);
                        if self.queue.send(QueueItem::Message { message, done: None }).is_err() {
                            log::warn!("⚠️  Queue closed, dropping scheduled update");
                        }
                    }
                }
                QueueItem::Shutdown => {
                    self.factory.teardown();
                    break;
                }
            }
        }

        log::info!("🛑 Statistics pipeline stopped after {} message(s)", processed);
    }

    /// Runs all actions of one message
    async fn process(&mut self, message: &InboundMessage) -> Result<(), PipelineError> {
        let now = (self.now_fn)();

        let actions = match self.factory.build(message, now) {
            Dispatch::Actions(actions) => actions,
            Dispatch::Ignored => {
                log::debug!("Ignoring message without a known topic: {}", message.data);
                return Ok(());
            }
            Dispatch::InvalidCommand(command) => {
                log::warn!("⚠️  Invalid command '{}'", command);
                self.host
                    .status(NodeStatus::new(StatusFill::Red, StatusShape::Dot, "invalid command"));
                return Ok(());
            }
        };

        let results =
            join_all(actions.iter().map(|action| self.run_action(action.as_ref(), message))).await;
        results.into_iter().collect()
    }

    async fn run_action(
        &self,
        action: &dyn Action,
        message: &InboundMessage,
    ) -> Result<(), PipelineError> {
        let input_definition = action.define_input();
        let output_definition = action.define_output();

        let input = self.read_inputs(&input_definition, message).await?;
        let output = action.execute(&input)?;
        self.write_outputs(&output_definition, &output).await?;
        self.send_messages(&output_definition, &output, message).await?;

        if let Some(status) = output.status() {
            self.host.status(status.clone());
        }
        Ok(())
    }

    /// Resolves all declared inputs concurrently
    async fn read_inputs(
        &self,
        definition: &InputDefinition,
        message: &InboundMessage,
    ) -> Result<Input, InputError> {
        let resolved = join_all(
            definition
                .iter()
                .map(|(name, definition)| self.read_input(name, definition, message)),
        )
        .await;

        let mut values = HashMap::new();
        for result in resolved {
            if let (name, Some(value)) = result? {
                values.insert(name, value);
            }
        }

        Ok(Input::new(values, message.clone()))
    }

    async fn read_input(
        &self,
        name: &str,
        definition: &InputValueDefinition,
        message: &InboundMessage,
    ) -> Result<(String, Option<Value>), InputError> {
        let raw = match definition.source {
            InputSource::Date => {
                return Ok((name.to_string(), Some(Value::from(message.received_at))));
            }
            InputSource::Msg => get_property(&message.data, &definition.property).cloned(),
            InputSource::Flow | InputSource::Global => {
                let scope = if definition.source == InputSource::Flow {
                    ContextScope::Flow
                } else {
                    ContextScope::Global
                };
                self.host
                    .read_context(scope, &ContextKey::parse(&definition.property))
                    .await
                    .map_err(|e| InputError::Lookup {
                        property: definition.location(),
                        reason: e.to_string(),
                    })?
            }
        };

        let value = match raw.or_else(|| definition.default.clone()) {
            Some(value) => value,
            None if definition.required => return Err(InputError::Missing(definition.location())),
            None => return Ok((name.to_string(), None)),
        };

        let value = match definition.kind {
            ValueKind::Any => Some(value),
            ValueKind::Number => match as_number(&value) {
                Some(number) => Some(number_value(number)),
                None if definition.required => {
                    return Err(InputError::NotNumeric(definition.location()));
                }
                None => None,
            },
        };

        Ok((name.to_string(), value))
    }

    /// Writes flow and global outputs; message outputs are handled by `send_messages`
    async fn write_outputs(
        &self,
        definition: &OutputDefinition,
        output: &Output,
    ) -> Result<(), OutputError> {
        let writes = definition.iter().filter_map(|(name, definition)| {
            let value = output.value(name)?;
            let scope = match definition.target {
                OutputTarget::Msg => return None,
                OutputTarget::Flow => ContextScope::Flow,
                OutputTarget::Global => ContextScope::Global,
            };
            let key = ContextKey::parse(&definition.property);
            Some(async move { self.host.write_context(scope, &key, value.clone()).await })
        });

        join_all(writes).await.into_iter().collect()
    }

    /// Assembles one message per channel and sends them
    async fn send_messages(
        &self,
        definition: &OutputDefinition,
        output: &Output,
        message: &InboundMessage,
    ) -> Result<(), OutputError> {
        if definition.is_empty() {
            return Ok(());
        }

        let channels = definition.values().map(|d| d.channel + 1).max().unwrap_or(0);
        let mut messages: Vec<Option<Value>> = vec![None; channels];

        for (name, definition) in definition {
            let value = match output.value(name) {
                Some(value) => value,
                None => continue,
            };

            let base = messages[definition.channel]
                .clone()
                .or_else(|| definition.message.clone())
                .unwrap_or_else(|| message.data.clone());

            messages[definition.channel] = Some(match definition.target {
                OutputTarget::Msg => {
                    let mut cloned = clone_message(&base);
                    if !set_property(&mut cloned, &definition.property, value.clone()) {
                        return Err(OutputError::MessageProperty(definition.property.clone()));
                    }
                    cloned
                }
                OutputTarget::Flow | OutputTarget::Global => base,
            });
        }

        if messages.iter().any(Option::is_some) {
            self.host.send(messages).await;
        } else {
            log::debug!("No output values, nothing to send");
        }
        Ok(())
    }

    /// Reports a failed message to the host
    fn report(&self, message: &InboundMessage, error: &PipelineError) {
        let text = error.to_string();
        log::error!("❌ Failed to process message: {}", text);
        self.host.error(&text, &message.data);
        self.host.status(NodeStatus::new(StatusFill::Red, StatusShape::Dot, text));
    }
}
