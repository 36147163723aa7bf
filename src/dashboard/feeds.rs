//! Dashboard Feeds
//!
//! Ready-made live bindings for the dashboard panels: the activity log,
//! system stats, per-agent status and the chat with one agent.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

use super::models::{ActivityLog, AgentStatus, Message, MessageSender, SystemOverview};
use super::reducers::{agent_status_for, chat_for, prepend_bounded, ChatState};
use crate::live::events;
use crate::live::{ConnectionManager, ConnectionState, LiveBinding, LiveOptions, Subscription};

/// Entries kept by [`ActivityFeed`]
pub const ACTIVITY_LOG_LIMIT: usize = 100;

/// Newest-first stream of `activity_log` entries
pub struct ActivityFeed {
    binding: LiveBinding<Vec<ActivityLog>>,
}

impl ActivityFeed {
    pub fn activate(manager: &ConnectionManager) -> Self {
        Self::with_limit(manager, ACTIVITY_LOG_LIMIT)
    }

    pub fn with_limit(manager: &ConnectionManager, limit: usize) -> Self {
        let binding = LiveBinding::activate(
            manager,
            LiveOptions::reduced(events::ACTIVITY_LOG, Vec::new(), prepend_bounded(limit)),
        );
        Self { binding }
    }

    pub fn entries(&self) -> Vec<ActivityLog> {
        self.binding.get()
    }

    pub fn len(&self) -> usize {
        self.binding.with(|e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.binding.set(Vec::new());
    }

    pub fn binding(&self) -> &LiveBinding<Vec<ActivityLog>> {
        &self.binding
    }
}

/// Latest `stats_update` snapshot, seeded from the HTTP overview
pub struct StatsFeed {
    binding: LiveBinding<Option<SystemOverview>>,
}

impl StatsFeed {
    pub fn activate(manager: &ConnectionManager, initial: Option<SystemOverview>) -> Self {
        let binding = LiveBinding::activate(
            manager,
            LiveOptions::new(events::STATS_UPDATE, initial),
        );
        Self { binding }
    }

    pub fn current(&self) -> Option<SystemOverview> {
        self.binding.get()
    }

    pub fn binding(&self) -> &LiveBinding<Option<SystemOverview>> {
        &self.binding
    }
}

/// Status of one agent.
///
/// Asks the server for the current status each time the connection comes up.
pub struct AgentStatusFeed {
    agent_id: i64,
    binding: LiveBinding<AgentStatus>,
    _on_connect: Subscription,
}

impl AgentStatusFeed {
    pub fn activate(manager: &ConnectionManager, agent_id: i64) -> Self {
        let binding = LiveBinding::activate(
            manager,
            LiveOptions::reduced(events::AGENT_STATUS, AgentStatus::Idle, agent_status_for(agent_id)),
        );

        let handle = manager.clone();
        let on_connect = manager.on_connection_change(move |state| {
            if state == ConnectionState::Connected {
                handle.emit(events::AGENT_STATUS_REQUEST, json!({ "agent_id": agent_id }));
            }
        });

        Self {
            agent_id,
            binding,
            _on_connect: on_connect,
        }
    }

    pub fn agent_id(&self) -> i64 {
        self.agent_id
    }

    pub fn status(&self) -> AgentStatus {
        self.binding.get()
    }

    pub fn is_connected(&self) -> bool {
        self.binding.is_connected()
    }

    /// Ask for a fresh status; ignored while disconnected
    pub fn request_status(&self) {
        if self.binding.is_connected() {
            self.binding
                .emit(events::AGENT_STATUS_REQUEST, json!({ "agent_id": self.agent_id }));
        }
    }
}

/// Chat error shown after a failed handshake
pub const CONNECT_FAILED: &str = "Failed to connect to server";

/// Why [`ChatSession::send`] did not send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejected {
    NotConnected,
    EmptyMessage,
}

/// Conversation with one agent over the live channel
pub struct ChatSession {
    agent_id: i64,
    binding: Arc<LiveBinding<ChatState>>,
    _on_connect: Subscription,
}

impl ChatSession {
    pub fn activate(manager: &ConnectionManager, agent_id: i64) -> Self {
        let binding = Arc::new(LiveBinding::activate(
            manager,
            LiveOptions::reduced(events::AGENT_RESPONSE, ChatState::default(), chat_for(agent_id))
                .event(events::AGENT_STATUS)
                .event(events::ERROR),
        ));

        // A fresh connection clears any stale error; a failed handshake sets one
        let weak = Arc::downgrade(&binding);
        let previous = Mutex::new(ConnectionState::Disconnected);
        let on_connect = manager.on_connection_change(move |state| {
            let before = std::mem::replace(&mut *previous.lock(), state);
            let Some(binding) = weak.upgrade() else {
                return;
            };
            match (before, state) {
                (_, ConnectionState::Connected) => binding.update(|s| s.error = None),
                (ConnectionState::Connecting, ConnectionState::Disconnected) => {
                    binding.update(|s| {
                        s.error = Some(CONNECT_FAILED.to_string());
                        s.loading = false;
                    });
                }
                _ => {}
            }
        });

        Self {
            agent_id,
            binding,
            _on_connect: on_connect,
        }
    }

    pub fn agent_id(&self) -> i64 {
        self.agent_id
    }

    /// Seed the conversation with history loaded over HTTP
    pub fn load_history(&self, messages: Vec<Message>) {
        self.binding.update(|s| s.messages = messages);
    }

    /// Send an operator message.
    ///
    /// The message is appended locally before the server confirms it.
    pub fn send(&self, content: &str) -> Result<(), SendRejected> {
        if !self.binding.is_connected() {
            self.binding
                .update(|s| s.error = Some("Not connected to server".to_string()));
            return Err(SendRejected::NotConnected);
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(SendRejected::EmptyMessage);
        }

        let message = Message::local(self.agent_id, MessageSender::Operator, content);
        self.binding.update(|s| {
            s.messages.push(message);
            s.loading = true;
            s.error = None;
        });

        self.binding.emit(
            events::SEND_MESSAGE,
            json!({ "agent_id": self.agent_id, "message": content }),
        );
        Ok(())
    }

    pub fn clear(&self) {
        self.binding.update(|s| s.messages.clear());
    }

    pub fn state(&self) -> ChatState {
        self.binding.get()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.binding.with(|s| s.messages.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.binding.with(|s| s.loading)
    }

    pub fn error(&self) -> Option<String> {
        self.binding.with(|s| s.error.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.binding.is_connected()
    }

    /// Watch for state changes, e.g. to redraw a chat window
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ChatState> {
        self.binding.subscribe()
    }
}
