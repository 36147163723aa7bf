//! REST API Client
//!
//! Typed access to the dashboard backend's HTTP endpoints:
//!
//! - `GET  /agents`, `/agents/{id}`, `/agents/{id}/messages`
//! - `POST /agents/{id}/message`
//! - `GET  /workflows`, `/workflows/{id}`, `/workflows/{id}/status`
//! - `POST /workflows`
//! - `GET  /stats/agents`, `/stats/workflows`, `/stats/overview`

mod client;
mod error;

pub use client::{ApiClient, NewWorkflow};
pub use error::ApiError;
