//! Scripted mock agent backend
//!
//! Plays a deterministic agent turn without any model behind it: each
//! attachment is "inspected" through a tool call, then the user's text is
//! echoed back word by word.

use crate::core::backend::{Backend, BackendError, BackendEventStream};
use crate::models::backend::{
    AssistantChunk, BackendContentBlock, BackendEvent, InputMessage, ToolCallChunk, ToolCallStart,
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Name of the tool the mock agent calls for each attachment
pub const INSPECT_TOOL: &str = "inspect_attachment";

/// Mock backend that replays a scripted turn
pub struct MockBackend {
    delay: Duration,
}

/// Attachment metadata extracted from an input block
struct Attachment {
    filename: Option<String>,
    mime_type: String,
    data: String,
}

impl MockBackend {
    /// Create a mock backend pausing `delay` between events
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Events of one scripted turn for the given input
    fn script(messages: &[InputMessage], conversation_id: &str) -> Vec<BackendEvent> {
        let Some(message) = messages.last() else {
            return vec![AssistantChunk::text("Nothing to respond to.").into()];
        };

        let mut words = Vec::new();
        let mut attachments = Vec::new();
        for block in &message.content {
            match block {
                BackendContentBlock::Text { text } => {
                    words.extend(text.split_whitespace().map(str::to_string));
                }
                BackendContentBlock::File {
                    filename,
                    mime_type,
                    data,
                    ..
                } => attachments.push(Attachment {
                    filename: filename.clone(),
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                }),
                BackendContentBlock::ImageUrl { image_url } => {
                    if let Ok(decoded) = crate::conversion::data_url::decode(&image_url.url) {
                        attachments.push(Attachment {
                            filename: None,
                            mime_type: decoded.mimetype,
                            data: decoded.payload,
                        });
                    }
                }
            }
        }

        let mut events = Vec::new();

        if !attachments.is_empty() {
            let ids: Vec<String> = (0..attachments.len())
                .map(|i| format!("call_{}_{}", short_id(conversation_id), i))
                .collect();

            events.push(
                AssistantChunk::tool_calls(
                    ids.iter()
                        .map(|id| ToolCallStart::new(id.as_str(), INSPECT_TOOL))
                        .collect(),
                )
                .into(),
            );

            for (position, attachment) in attachments.iter().enumerate() {
                let args = json!({
                    "filename": attachment.filename,
                    "mimeType": attachment.mime_type,
                })
                .to_string();
                let mut mid = args.len() / 2;
                while !args.is_char_boundary(mid) {
                    mid -= 1;
                }
                let (head, tail) = args.split_at(mid);
                events.push(
                    AssistantChunk::tool_call_chunks(vec![
                        ToolCallChunk::new(position, head),
                        ToolCallChunk::new(position, tail),
                    ])
                    .into(),
                );
            }

            for (id, attachment) in ids.into_iter().zip(&attachments) {
                events.push(BackendEvent::ToolResult {
                    tool_call_id: id,
                    result: inspect(attachment),
                });
            }

            events.push(
                AssistantChunk::text(format!(
                    "Received {} attachment(s). ",
                    attachments.len()
                ))
                .into(),
            );
        }

        if words.is_empty() {
            events.push(AssistantChunk::text("(no text)").into());
        } else {
            events.push(AssistantChunk::text("You said: ").into());
            let last = words.len() - 1;
            for (i, word) in words.into_iter().enumerate() {
                let fragment = if i == last { word } else { format!("{} ", word) };
                events.push(AssistantChunk::text(fragment).into());
            }
        }

        events
    }
}

/// Result payload of the inspection tool
fn inspect(attachment: &Attachment) -> Value {
    match STANDARD.decode(&attachment.data) {
        Ok(bytes) => json!({
            "filename": attachment.filename,
            "mimeType": attachment.mime_type,
            "bytes": bytes.len(),
        }),
        Err(e) => json!({
            "filename": attachment.filename,
            "mimeType": attachment.mime_type,
            "error": format!("invalid base64 payload: {}", e),
        }),
    }
}

/// First 8 alphanumeric characters of the conversation id
fn short_id(conversation_id: &str) -> String {
    let id: String = conversation_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(8)
        .collect();
    if id.is_empty() { "mock".to_string() } else { id }
}

#[async_trait]
impl Backend for MockBackend {
    async fn stream_events(
        &self,
        messages: Vec<InputMessage>,
        conversation_id: &str,
    ) -> Result<BackendEventStream, BackendError> {
        let events = Self::script(&messages, conversation_id);
        debug!(
            "Mock turn for conversation {}: {} event(s)",
            conversation_id,
            events.len()
        );

        let delay = self.delay;
        let stream = async_stream::stream! {
            for event in events {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(event);
            }
        };

        Ok(Box::pin(stream))
    }

    fn backend_name(&self) -> &str {
        "Mock"
    }
}
