//! OpenAI API data models
//!
//! Only what the OpenAI backend sends and reads: the outgoing streaming
//! chat-completion request and the incremental chunks that come back.
//! Unknown chunk fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outgoing chat message
#[derive(Debug, Clone, Serialize)]
pub struct OpenAIMessage {
    pub role: String,
    /// Plain string or array of content parts
    pub content: Value,
}

/// Streaming chat completion request
#[derive(Debug, Clone, Serialize)]
pub struct OpenAIChatCompletionRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub stream: bool,
    /// End-user identifier, carries the conversation id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// One `data:` payload of the completion stream
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIStreamingChunk {
    #[serde(default)]
    pub choices: Vec<OpenAIStreamChoice>,
    /// In-band error object sent after a 200 response
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIStreamChoice {
    #[serde(default)]
    pub delta: OpenAIDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

/// Tool call delta; `id` and the function name only appear in the first one
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIToolCallDelta {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<OpenAIFunctionDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}
