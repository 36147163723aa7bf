//! Dashboard Data Types
//!
//! Shapes shared by the HTTP API and the live event channel.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Role of an agent in the startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// CEO
    Driver,
    /// Researcher
    Creator,
    /// HR manager
    Generator,
    /// Spawned at runtime
    Dynamic,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Driver => "driver",
            AgentKind::Creator => "creator",
            AgentKind::Generator => "generator",
            AgentKind::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('/').to_lowercase().as_str() {
            "driver" => Ok(AgentKind::Driver),
            "creator" => Ok(AgentKind::Creator),
            "generator" => Ok(AgentKind::Generator),
            "dynamic" => Ok(AgentKind::Dynamic),
            other => Err(format!("unknown agent kind: {}", other)),
        }
    }
}

/// Agent activity. The server also reports `busy`, which means working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    #[serde(alias = "busy")]
    Working,
    Waiting,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Working => "working",
            AgentStatus::Waiting => "waiting",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    pub role: String,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    Agent,
    Operator,
    System,
}

/// One chat line between the operator and an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub agent_id: i64,
    pub sender: MessageSender,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, alias = "meta")]
    pub metadata: Option<Value>,
}

impl Message {
    /// A locally created message, stamped with the current time
    pub fn local(agent_id: i64, sender: MessageSender, content: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            // Temporary id until the server assigns one
            id: now.timestamp_millis(),
            agent_id,
            sender,
            content: content.into(),
            timestamp: Some(now.to_rfc3339()),
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRef {
    pub id: i64,
    pub name: String,
}

/// Activity log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub level: ActivityLevel,
    pub message: String,
    #[serde(default)]
    pub agent: Option<AgentRef>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentStats {
    pub total: u64,
    pub active: u64,
    pub idle: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkflowStats {
    pub total: u64,
    pub active: u64,
    pub completed: u64,
    #[serde(default)]
    pub failed: Option<u64>,
}

/// Aggregate snapshot from `/stats/overview` and `stats_update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SystemOverview {
    pub agents: AgentStats,
    pub workflows: WorkflowStats,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default, alias = "meta")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub workflow_id: i64,
    #[serde(default)]
    pub assigned_to: Option<i64>,
    pub status: TaskStatus,
    pub description: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// Response of `/workflows/{id}/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    pub workflow: Workflow,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Response of the root health endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}
