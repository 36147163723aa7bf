//! Event Reducers
//!
//! Pure `(payload, &state) -> state` merges used by the dashboard feeds.
//! Payloads that do not decode leave the state untouched.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::models::{AgentStatus, Message, MessageSender};

/// Newest-first list capped at `limit` entries
pub fn prepend_bounded<T>(limit: usize) -> impl Fn(&Value, &Vec<T>) -> Vec<T> + Send + Sync
where
    T: DeserializeOwned + Clone,
{
    move |payload, current| match T::deserialize(payload) {
        Ok(item) => {
            let mut next = Vec::with_capacity(limit.min(current.len() + 1));
            next.push(item);
            next.extend(current.iter().take(limit.saturating_sub(1)).cloned());
            next.truncate(limit);
            next
        }
        Err(e) => {
            tracing::debug!(error = %e, "Dropping undecodable list entry");
            current.clone()
        }
    }
}

/// Oldest-first list keeping the last `limit` entries
pub fn append_bounded<T>(limit: usize) -> impl Fn(&Value, &Vec<T>) -> Vec<T> + Send + Sync
where
    T: DeserializeOwned + Clone,
{
    move |payload, current| match T::deserialize(payload) {
        Ok(item) => {
            let skip = (current.len() + 1).saturating_sub(limit);
            let mut next: Vec<T> = current.iter().skip(skip).cloned().collect();
            if limit > 0 {
                next.push(item);
            }
            next
        }
        Err(e) => {
            tracing::debug!(error = %e, "Dropping undecodable list entry");
            current.clone()
        }
    }
}

/// `agent_status` payload
#[derive(Debug, Clone, Deserialize)]
pub struct AgentStatusEvent {
    pub agent_id: i64,
    pub status: AgentStatus,
}

/// Track the status of one agent, ignoring everyone else's updates
pub fn agent_status_for(agent_id: i64) -> impl Fn(&Value, &AgentStatus) -> AgentStatus + Send + Sync {
    move |payload, current| match AgentStatusEvent::deserialize(payload) {
        Ok(event) if event.agent_id == agent_id => event.status,
        _ => *current,
    }
}

/// Payloads a chat session listens to, told apart by shape
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatEvent {
    /// `agent_response`
    Response {
        agent_id: i64,
        message: String,
        #[serde(default)]
        agent_name: Option<String>,
    },
    /// `agent_status`
    Status { agent_id: i64, status: AgentStatus },
    /// `error`
    Error {
        error: String,
        #[serde(default)]
        agent_id: Option<i64>,
    },
}

/// State of a chat with one agent
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatState {
    pub messages: Vec<Message>,
    /// The agent is working on a reply
    pub loading: bool,
    pub status: AgentStatus,
    pub error: Option<String>,
}

/// Fold chat events for `agent_id` into a [`ChatState`]
pub fn chat_for(agent_id: i64) -> impl Fn(&Value, &ChatState) -> ChatState + Send + Sync {
    move |payload, current| {
        let event = match ChatEvent::deserialize(payload) {
            Ok(event) => event,
            Err(_) => return current.clone(),
        };

        let mut next = current.clone();
        match event {
            ChatEvent::Response {
                agent_id: id,
                message,
                ..
            } if id == agent_id => {
                next.loading = false;
                next.messages
                    .push(Message::local(agent_id, MessageSender::Agent, message));
            }
            ChatEvent::Status { agent_id: id, status } if id == agent_id => {
                next.loading = status == AgentStatus::Working;
                next.status = status;
            }
            ChatEvent::Error {
                error,
                agent_id: target,
            } if target.map_or(true, |id| id == agent_id) => {
                tracing::warn!(agent_id, error = %error, "Server reported chat error");
                next.error = Some(error);
                next.loading = false;
            }
            _ => return current.clone(),
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prepend_bounded_keeps_newest() {
        let reduce = prepend_bounded::<u32>(3);
        let mut state = Vec::new();
        for n in 1..=5 {
            state = reduce(&json!(n), &state);
        }
        assert_eq!(state, vec![5, 4, 3]);
    }

    #[test]
    fn test_prepend_bounded_ignores_garbage() {
        let reduce = prepend_bounded::<u32>(3);
        let state = reduce(&json!("nope"), &vec![1]);
        assert_eq!(state, vec![1]);
    }

    #[test]
    fn test_append_bounded_keeps_latest() {
        let reduce = append_bounded::<u32>(2);
        let mut state = Vec::new();
        for n in 1..=4 {
            state = reduce(&json!(n), &state);
        }
        assert_eq!(state, vec![3, 4]);
    }

    #[test]
    fn test_agent_status_filters_by_id() {
        let reduce = agent_status_for(2);
        let state = reduce(&json!({"agent_id": 1, "status": "busy"}), &AgentStatus::Idle);
        assert_eq!(state, AgentStatus::Idle);

        let state = reduce(&json!({"agent_id": 2, "status": "busy"}), &state);
        assert_eq!(state, AgentStatus::Working);

        let state = reduce(&json!({"agent_id": 2, "status": "sleeping"}), &state);
        assert_eq!(state, AgentStatus::Working);
    }

    #[test]
    fn test_chat_response_appends_agent_message() {
        let reduce = chat_for(1);
        let state = ChatState {
            loading: true,
            ..Default::default()
        };
        let state = reduce(
            &json!({"agent_id": 1, "message": "done", "sender": "agent", "agent_name": "Driver"}),
            &state,
        );
        assert!(!state.loading);
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].sender, MessageSender::Agent);
        assert_eq!(state.messages[0].content, "done");
    }

    #[test]
    fn test_chat_status_drives_loading() {
        let reduce = chat_for(1);
        let state = reduce(&json!({"agent_id": 1, "status": "busy"}), &ChatState::default());
        assert!(state.loading);
        assert_eq!(state.status, AgentStatus::Working);

        let state = reduce(&json!({"agent_id": 1, "status": "idle"}), &state);
        assert!(!state.loading);
    }

    #[test]
    fn test_chat_ignores_other_agents() {
        let reduce = chat_for(1);
        let state = reduce(&json!({"agent_id": 2, "message": "hi"}), &ChatState::default());
        assert!(state.messages.is_empty());
    }

    #[test]
    fn test_chat_error_without_agent_applies() {
        let reduce = chat_for(1);
        let state = ChatState {
            loading: true,
            ..Default::default()
        };
        let state = reduce(&json!({"error": "agent_id and message required"}), &state);
        assert_eq!(state.error.as_deref(), Some("agent_id and message required"));
        assert!(!state.loading);

        let other = reduce(&json!({"error": "x", "agent_id": 9}), &ChatState::default());
        assert!(other.error.is_none());
    }
}
