//! API Error Types
//!
//! Errors raised by the REST client, classified the way callers need to
//! react to them.

use serde::Deserialize;
use thiserror::Error;

/// REST client errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// Backend not reachable
    #[error("API unavailable: {0}")]
    Unavailable(String),

    /// Request exceeded the configured timeout
    #[error("Request timeout")]
    Timeout,

    /// Backend answered with a non-success status
    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Any other transport failure
    #[error("Request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_connect() {
            ApiError::Unavailable(e.to_string())
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Request(e)
        }
    }
}

/// Error body returned by the backend (`{"error": "..."}`)
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}
