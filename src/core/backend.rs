//! Abstraction over agent-execution backends
//!
//! A backend runs one conversation turn and streams typed events back. The
//! conversation id is opaque here and only forwarded for the backend's own
//! session continuity.

use crate::models::backend::{BackendEvent, InputMessage};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;
use thiserror::Error;

/// Error types for backend operations
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl BackendError {
    /// Map a non-success HTTP status to the matching variant
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => BackendError::Authentication(message),
            429 => BackendError::RateLimit(message),
            400 => BackendError::BadRequest(message),
            _ => BackendError::ApiError { status, message },
        }
    }
}

/// Event stream of a single turn
pub type BackendEventStream = Pin<Box<dyn Stream<Item = Result<BackendEvent, BackendError>> + Send>>;

/// Trait for agent-execution backends
#[async_trait]
pub trait Backend: Send + Sync {
    /// Start a turn and return its event stream
    ///
    /// Dropping the stream abandons the turn.
    async fn stream_events(
        &self,
        messages: Vec<InputMessage>,
        conversation_id: &str,
    ) -> Result<BackendEventStream, BackendError>;

    /// Get the backend name
    fn backend_name(&self) -> &str;
}

/// Supported backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    OpenAI,
    Mock,
}

impl BackendType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Some(BackendType::OpenAI),
            "mock" => Some(BackendType::Mock),
            _ => None,
        }
    }
}
