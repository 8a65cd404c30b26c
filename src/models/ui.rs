//! Chat UI data models
//!
//! Request shapes posted by the chat UI's data-stream runtime.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One block of a UI message, keyed by its `type` field
///
/// Any block that is not a `text`, `file` or `image` object (unknown or
/// missing `type`, non-object values) deserializes to `Unknown` so it can be
/// skipped instead of failing the whole request.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text { text: String },
    /// `data` is a data URL with an optional `,filename:` suffix
    File { data: String },
    Image { image: String },
    Unknown,
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(match value.get("type").and_then(Value::as_str) {
            Some("text") => ContentBlock::Text {
                text: field("text"),
            },
            Some("file") => ContentBlock::File {
                data: field("data"),
            },
            Some("image") => ContentBlock::Image {
                image: field("image"),
            },
            _ => ContentBlock::Unknown,
        })
    }
}

/// A single message in the UI thread
#[derive(Debug, Clone, Deserialize)]
pub struct UiMessage {
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// Body of a chat submission
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<UiMessage>,
}
