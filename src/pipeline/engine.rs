//! Topic table and command routing
//!
//! The [`ActionFactory`] owns the per-topic state of one node. For every
//! inbound message it decides which actions run:
//!
//! - no command → value action for the topic (created on first use)
//! - `update` / `updateAll` → update action(s) for known topics
//! - `clear` / `clearAll` → clear action(s) for known topics
//!
//! Command names are case-insensitive; `-` and `_` are ignored, so
//! `update-all` and `UPDATE_ALL` both mean `updateAll`.

use super::action::{Action, NodeStatus, StatusFill, StatusShape};
use super::actions::{ClearAction, UpdateAction, ValueAction};
use super::config::Configuration;
use super::message::InboundMessage;
use super::scheduler::{TopicTiming, UpdateScheduler};
use super::state::{lock, SharedTopicState, TopicState};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of routing one message
pub enum Dispatch {
    /// Actions to run concurrently; may be empty
    Actions(Vec<Box<dyn Action>>),
    /// Nothing to do (no topic, or unknown topic for `update`/`clear`)
    Ignored,
    /// The message carried a command nobody understands
    InvalidCommand(String),
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatch::Actions(actions) => write!(f, "Actions({})", actions.len()),
            Dispatch::Ignored => write!(f, "Ignored"),
            Dispatch::InvalidCommand(command) => write!(f, "InvalidCommand({})", command),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Update,
    UpdateAll,
    Clear,
    ClearAll,
}

impl Command {
    fn parse(text: &str) -> Option<Self> {
        let normalized: String = text
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "update" => Some(Command::Update),
            "updateall" => Some(Command::UpdateAll),
            "clear" => Some(Command::Clear),
            "clearall" => Some(Command::ClearAll),
            _ => None,
        }
    }
}

pub struct ActionFactory {
    config: Arc<Configuration>,
    /// Topics in order of first appearance
    topics: Vec<String>,
    states: HashMap<String, SharedTopicState>,
    scheduler: UpdateScheduler,
}

impl ActionFactory {
    pub fn new(config: Arc<Configuration>, scheduler: UpdateScheduler) -> Self {
        Self {
            config,
            topics: Vec::new(),
            states: HashMap::new(),
            scheduler,
        }
    }

    /// Routes a message to the actions that handle it
    pub fn build(&mut self, message: &InboundMessage, now: i64) -> Dispatch {
        let topic = match message.topic() {
            Some(topic) => topic,
            None => return Dispatch::Ignored,
        };

        if let Some(text) = message.command() {
            let command = match Command::parse(text) {
                Some(command) => command,
                None => return Dispatch::InvalidCommand(text.to_string()),
            };
            return self.build_command(command, &topic, now);
        }

        let state = match self.states.get(&topic) {
            Some(state) => Arc::clone(state),
            None => {
                let state = TopicState::shared(Arc::clone(&self.config));
                self.states.insert(topic.clone(), Arc::clone(&state));
                self.topics.push(topic.clone());
                log::debug!("🆕 New topic '{}' ({} total)", topic, self.topics.len());
                self.update_ids();
                state
            }
        };

        self.scheduler.schedule(now);

        Dispatch::Actions(vec![Box::new(ValueAction::new(Arc::clone(&self.config), state))])
    }

    fn build_command(&mut self, command: Command, topic: &str, now: i64) -> Dispatch {
        match command {
            Command::Update => {
                let state = match self.states.get(topic) {
                    Some(state) => Arc::clone(state),
                    None => return Dispatch::Ignored,
                };
                self.scheduler.schedule(now);
                Dispatch::Actions(vec![Box::new(UpdateAction::new(
                    Arc::clone(&self.config),
                    state,
                ))])
            }
            Command::UpdateAll => {
                let actions = self
                    .ordered_states()
                    .map(|state| -> Box<dyn Action> {
                        Box::new(UpdateAction::new(Arc::clone(&self.config), state))
                    })
                    .collect();
                self.scheduler.schedule(now);
                Dispatch::Actions(actions)
            }
            Command::Clear => match self.states.get(topic) {
                Some(state) => {
                    Dispatch::Actions(vec![Box::new(ClearAction::new(Arc::clone(state)))])
                }
                None => Dispatch::Ignored,
            },
            Command::ClearAll => {
                let actions = self
                    .ordered_states()
                    .map(|state| Box::new(ClearAction::new(state)) as Box<dyn Action>)
                    .collect();
                self.scheduler.cancel();
                Dispatch::Actions(actions)
            }
        }
    }

    /// Initial status before any sample arrived
    pub fn setup(&self) -> NodeStatus {
        NodeStatus::new(StatusFill::Yellow, StatusShape::Dot, "no events")
    }

    pub fn teardown(&mut self) {
        self.scheduler.cancel();
    }

    /// Handles a timer firing; returns synthetic `update` commands for due topics
    pub fn execute_update(&mut self, generation: u64, now: i64) -> Vec<Value> {
        let timings: Vec<(String, TopicTiming)> = self
            .topics
            .iter()
            .filter_map(|topic| self.states.get(topic).map(|state| (topic, state)))
            .map(|(topic, state)| {
                let state = lock(state);
                (
                    topic.clone(),
                    TopicTiming {
                        event_count: state.event_count(),
                        last_event_at: state.last_event_at(),
                        last_update_at: state.last_update_at(),
                    },
                )
            })
            .collect();

        self.scheduler
            .on_tick(generation, now, &timings)
            .into_iter()
            .map(|topic| json!({"topic": topic, "command": "update", "timestamp": now}))
            .collect()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Display id of a topic, e.g. `02`
    pub fn display_id(&self, topic: &str) -> Option<String> {
        self.states.get(&topic.to_lowercase()).map(|state| lock(state).id().to_string())
    }

    pub fn is_timer_armed(&self) -> bool {
        self.scheduler.is_armed()
    }

    fn ordered_states(&self) -> impl Iterator<Item = SharedTopicState> + '_ {
        self.topics
            .iter()
            .filter_map(|topic| self.states.get(topic))
            .map(Arc::clone)
    }

    /// Renumbers all topics; ids are at least two digits wide
    fn update_ids(&self) {
        let width = self.topics.len().to_string().len().max(2);
        for (index, state) in self.ordered_states().enumerate() {
            lock(&state).set_id(format!("{:0width$}", index + 1, width = width));
        }
    }
}
