//! Dashboard REST API Client
//!
//! HTTP client for the initial data loads: agents, message history,
//! workflows and stats. Live updates arrive over the event channel instead.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::error::{ApiError, ErrorBody};
use crate::dashboard::{
    Agent, AgentStats, Health, Message, SystemOverview, Workflow, WorkflowProgress, WorkflowStats,
};

/// REST API client
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

/// Body of `POST /workflows`
#[derive(Debug, Clone, Serialize)]
pub struct NewWorkflow {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `http://localhost:5000/api`)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Request)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ============ Agents ============

    pub async fn list_agents(&self) -> Result<Vec<Agent>, ApiError> {
        self.get("/agents").await
    }

    pub async fn get_agent(&self, id: i64) -> Result<Agent, ApiError> {
        self.get(&format!("/agents/{}", id)).await
    }

    /// Message history for an agent, oldest first
    pub async fn agent_messages(&self, id: i64, limit: Option<u32>) -> Result<Vec<Message>, ApiError> {
        let path = match limit {
            Some(limit) => format!("/agents/{}/messages?limit={}", id, limit),
            None => format!("/agents/{}/messages", id),
        };
        self.get(&path).await
    }

    /// Record an operator message; returns the stored message
    pub async fn send_agent_message(&self, id: i64, message: &str) -> Result<Message, ApiError> {
        let body = serde_json::json!({ "message": message });
        self.post(&format!("/agents/{}/message", id), &body).await
    }

    // ============ Workflows ============

    pub async fn list_workflows(&self) -> Result<Vec<Workflow>, ApiError> {
        self.get("/workflows").await
    }

    pub async fn get_workflow(&self, id: i64) -> Result<Workflow, ApiError> {
        self.get(&format!("/workflows/{}", id)).await
    }

    pub async fn create_workflow(&self, workflow: &NewWorkflow) -> Result<Workflow, ApiError> {
        self.post("/workflows", workflow).await
    }

    pub async fn workflow_status(&self, id: i64) -> Result<WorkflowProgress, ApiError> {
        self.get(&format!("/workflows/{}/status", id)).await
    }

    // ============ Stats ============

    pub async fn agent_stats(&self) -> Result<AgentStats, ApiError> {
        self.get("/stats/agents").await
    }

    pub async fn workflow_stats(&self) -> Result<WorkflowStats, ApiError> {
        self.get("/stats/workflows").await
    }

    pub async fn overview(&self) -> Result<SystemOverview, ApiError> {
        self.get("/stats/overview").await
    }

    /// Root health check; served next to `/api`, not under it
    pub async fn health(&self) -> Result<Health, ApiError> {
        let root = self
            .base_url
            .strip_suffix("/api")
            .unwrap_or(&self.base_url);
        let response = self.client.get(format!("{}/", root)).send().await?;
        Self::decode(response).await
    }

    // ============ Helpers ============

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        tracing::debug!(url = %url, "GET");
        let response = self.client.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        tracing::debug!(url = %url, "POST");
        let response = self.client.post(&url).json(body).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| ApiError::Decode(e.to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or_else(|_| {
                if text.is_empty() {
                    status.canonical_reason().unwrap_or("unknown error").to_string()
                } else {
                    text
                }
            });

        tracing::warn!(status = status.as_u16(), error = %message, "API request failed");
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{AgentKind, AgentStatus, WorkflowStatus};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(&format!("{}/api/", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:5000/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000/api");
    }

    #[tokio::test]
    async fn test_list_agents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/agents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "name": "Driver", "type": "driver", "role": "CEO", "status": "busy",
                 "config": null, "created_at": "2025-01-01T00:00:00"},
                {"id": 2, "name": "Creator", "type": "creator", "role": "Researcher", "status": "idle",
                 "config": null, "created_at": null}
            ])))
            .mount(&server)
            .await;

        let agents = client_for(&server).await.list_agents().await.unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].kind, AgentKind::Driver);
        assert_eq!(agents[0].status, AgentStatus::Working);
    }

    #[tokio::test]
    async fn test_agent_messages_with_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/agents/3/messages"))
            .and(query_param("limit", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 10, "agent_id": 3, "sender": "operator", "content": "hi",
                 "timestamp": "2025-01-01T00:00:00", "meta": null}
            ])))
            .mount(&server)
            .await;

        let messages = client_for(&server).await.agent_messages(3, Some(50)).await.unwrap();
        assert_eq!(messages[0].content, "hi");
    }

    #[tokio::test]
    async fn test_send_agent_message_posts_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agents/1/message"))
            .and(body_json(json!({"message": "status?"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!(
                {"id": 11, "agent_id": 1, "sender": "operator", "content": "status?", "timestamp": null}
            )))
            .mount(&server)
            .await;

        let message = client_for(&server).await.send_agent_message(1, "status?").await.unwrap();
        assert_eq!(message.id, 11);
    }

    #[tokio::test]
    async fn test_error_body_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/workflows"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "Workflow name required"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .create_workflow(&NewWorkflow {
                name: String::new(),
                description: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.to_string(), "API error 400: Workflow name required");
    }

    #[tokio::test]
    async fn test_not_found_without_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/agents/99"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server).await.get_agent(99).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_workflow_status_and_overview() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/workflows/5/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "workflow": {"id": 5, "name": "Launch", "description": null, "status": "active",
                             "started_at": "2025-01-01T00:00:00", "completed_at": null, "meta": null},
                "tasks": [{"id": 1, "workflow_id": 5, "assigned_to": 2, "status": "in_progress",
                           "description": "research", "result": null,
                           "created_at": null, "completed_at": null}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/stats/overview"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "agents": {"total": 3, "active": 1, "idle": 2},
                "workflows": {"total": 1, "active": 1, "completed": 0},
                "status": "online"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let progress = client.workflow_status(5).await.unwrap();
        assert_eq!(progress.workflow.status, WorkflowStatus::Active);
        assert_eq!(progress.tasks.len(), 1);

        let overview = client.overview().await.unwrap();
        assert_eq!(overview.status, "online");
    }

    #[tokio::test]
    async fn test_health_uses_root() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "ok", "message": "Virtual Startup API"})),
            )
            .mount(&server)
            .await;

        let health = client_for(&server).await.health().await.unwrap();
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let client = ApiClient::new("http://127.0.0.1:9/api", Duration::from_secs(2)).unwrap();
        let err = client.list_agents().await.unwrap_err();
        assert!(matches!(err, ApiError::Unavailable(_) | ApiError::Timeout));
    }
}
