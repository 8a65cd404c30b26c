//! Agent backend data models
//!
//! Content blocks sent to the backend, and the closed set of events the
//! backend streams back while running a conversation turn.

use crate::core::constants::role;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Encoding of an inline file payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Base64,
}

/// Embeddable image reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Content block in the format the agent backend consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendContentBlock {
    Text {
        text: String,
    },
    File {
        source_type: SourceType,
        filename: Option<String>,
        mime_type: String,
        /// Base64 payload, never re-encoded
        data: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
}

/// A message handed to the backend for one conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMessage {
    pub role: String,
    pub content: Vec<BackendContentBlock>,
}

impl InputMessage {
    pub fn user(content: Vec<BackendContentBlock>) -> Self {
        Self {
            role: role::USER.to_string(),
            content,
        }
    }
}

/// Entry of a tool-call-start batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallStart {
    /// Missing ids are replaced with a fresh UUID by the encoder
    pub id: Option<String>,
    pub name: Option<String>,
}

impl ToolCallStart {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
        }
    }
}

/// Positionally addressed fragment of tool-call arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallChunk {
    /// Position in the current batch; absent means 0
    pub index: Option<usize>,
    pub args: Option<String>,
}

impl ToolCallChunk {
    pub fn new(index: usize, args: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            args: Some(args.into()),
        }
    }
}

/// Streamed fragment of an assistant message
///
/// Any subset of the fields may be absent or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssistantChunk {
    pub text: Option<String>,
    pub tool_calls: Option<Vec<ToolCallStart>>,
    pub tool_call_chunks: Option<Vec<ToolCallChunk>>,
}

impl AssistantChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn tool_calls(batch: Vec<ToolCallStart>) -> Self {
        Self {
            tool_calls: Some(batch),
            ..Self::default()
        }
    }

    pub fn tool_call_chunks(chunks: Vec<ToolCallChunk>) -> Self {
        Self {
            tool_call_chunks: Some(chunks),
            ..Self::default()
        }
    }
}

/// Event produced by the backend while it runs a turn
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    AssistantChunk(AssistantChunk),
    ToolResult { tool_call_id: String, result: Value },
}

impl From<AssistantChunk> for BackendEvent {
    fn from(chunk: AssistantChunk) -> Self {
        BackendEvent::AssistantChunk(chunk)
    }
}
