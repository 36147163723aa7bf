//! Dashboard Domain
//!
//! Data types for agents, chats, workflows and stats, the pure reducers that
//! fold live events into them, and feeds wiring both onto live bindings.

mod feeds;
mod models;
pub mod reducers;

pub use feeds::{
    ActivityFeed, AgentStatusFeed, ChatSession, SendRejected, StatsFeed, ACTIVITY_LOG_LIMIT,
    CONNECT_FAILED,
};
pub use models::{
    ActivityLevel, ActivityLog, Agent, AgentKind, AgentRef, AgentStats, AgentStatus, Health,
    Message, MessageSender, SystemOverview, Task, TaskStatus, Workflow, WorkflowProgress,
    WorkflowStats, WorkflowStatus,
};
pub use reducers::ChatState;
