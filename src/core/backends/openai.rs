//! OpenAI backend implementation
//!
//! Runs a turn as a streaming chat completion against an OpenAI-compatible
//! endpoint (OpenAI or Azure OpenAI) and turns the SSE chunks into backend
//! events.

use crate::core::backend::{Backend, BackendError, BackendEventStream};
use crate::models::backend::{
    AssistantChunk, BackendContentBlock, BackendEvent, InputMessage, ToolCallChunk, ToolCallStart,
};
use crate::models::openai::{OpenAIChatCompletionRequest, OpenAIMessage, OpenAIStreamingChunk};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use futures_util::TryStreamExt;
use reqwest::Client;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, warn};

/// Settings for an OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAISettings {
    pub api_key: String,
    pub base_url: String,
    /// Azure API version; enables Azure deployment routing
    pub api_version: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    /// Request timeout in seconds
    pub timeout: u64,
}

/// OpenAI backend (supports OpenAI and Azure OpenAI)
pub struct OpenAIBackend {
    client: Client,
    settings: OpenAISettings,
}

impl OpenAIBackend {
    /// Create a new OpenAI backend
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unexpected` if the HTTP client cannot be built.
    pub fn new(settings: OpenAISettings) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout))
            .build()
            .map_err(|e| BackendError::Unexpected(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }

    /// Classify OpenAI errors and provide helpful messages
    fn classify_error(error_detail: &str) -> String {
        let error_lower = error_detail.to_lowercase();

        if error_lower.contains("invalid_api_key") || error_lower.contains("unauthorized") {
            return "Invalid API key. Please check the [openai] api_key setting.".to_string();
        }

        if error_lower.contains("rate_limit") || error_lower.contains("quota") {
            return "Rate limit exceeded. Please wait and try again, or upgrade your API plan."
                .to_string();
        }

        if error_lower.contains("model")
            && (error_lower.contains("not found") || error_lower.contains("does not exist"))
        {
            return "Model not found. Please check the [openai] model setting.".to_string();
        }

        error_detail.to_string()
    }

    fn completions_url(&self) -> String {
        match &self.settings.api_version {
            Some(version) => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.settings.base_url, self.settings.model, version
            ),
            None => format!("{}/chat/completions", self.settings.base_url),
        }
    }

    /// Build the streaming request for one turn
    fn build_request(
        &self,
        messages: &[InputMessage],
        conversation_id: &str,
    ) -> OpenAIChatCompletionRequest {
        OpenAIChatCompletionRequest {
            model: self.settings.model.clone(),
            messages: messages.iter().map(convert_input_message).collect(),
            temperature: self.settings.temperature,
            stream: true,
            user: Some(conversation_id.to_string()),
        }
    }

    /// Internal method to send streaming request
    async fn send_stream_request(
        &self,
        request: &OpenAIChatCompletionRequest,
    ) -> Result<reqwest::Response, BackendError> {
        let mut req_builder = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json");

        if self.settings.api_version.is_some() {
            req_builder = req_builder.header("api-key", &self.settings.api_key);
        } else {
            req_builder = req_builder.bearer_auth(&self.settings.api_key);
        }

        let response = req_builder
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Unexpected(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BackendError::from_status(
                status.as_u16(),
                Self::classify_error(&error_text),
            ));
        }

        Ok(response)
    }
}

/// Convert a backend input message to OpenAI format
///
/// A message made of a single text block collapses to a plain string.
fn convert_input_message(message: &InputMessage) -> OpenAIMessage {
    if let [BackendContentBlock::Text { text }] = message.content.as_slice() {
        return OpenAIMessage {
            role: message.role.clone(),
            content: Value::String(text.clone()),
        };
    }

    let parts = message
        .content
        .iter()
        .map(|block| match block {
            BackendContentBlock::Text { text } => json!({
                "type": "text",
                "text": text
            }),
            BackendContentBlock::ImageUrl { image_url } => json!({
                "type": "image_url",
                "image_url": { "url": image_url.url }
            }),
            BackendContentBlock::File {
                filename,
                mime_type,
                data,
                ..
            } => json!({
                "type": "file",
                "file": {
                    "filename": filename,
                    "file_data": format!("data:{};base64,{}", mime_type, data)
                }
            }),
        })
        .collect();

    OpenAIMessage {
        role: message.role.clone(),
        content: Value::Array(parts),
    }
}

/// Classification of one SSE line
#[derive(Debug, PartialEq, Eq)]
enum SseLine<'a> {
    Data(&'a str),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine<'_> {
    let trimmed = line.trim();
    match trimmed.strip_prefix("data:") {
        Some(data) if data.trim() == "[DONE]" => SseLine::Done,
        Some(data) => SseLine::Data(data.trim()),
        None => SseLine::Skip,
    }
}

/// Turns OpenAI tool-call deltas into batch/fragment events
///
/// OpenAI names each tool call once (in the delta carrying its id) and then
/// streams its arguments by index. Whenever a chunk names a new call, the
/// batch of every call named so far is re-sent in index order so that
/// fragment positions line up with the batch.
#[derive(Debug, Default)]
struct ChunkTranslator {
    turn_calls: BTreeMap<u32, ToolCallStart>,
}

impl ChunkTranslator {
    fn translate(&mut self, chunk: OpenAIStreamingChunk) -> Option<AssistantChunk> {
        let choice = chunk.choices.into_iter().next()?;
        let delta = choice.delta;

        let mut event = AssistantChunk {
            text: delta.content.filter(|content| !content.is_empty()),
            ..AssistantChunk::default()
        };

        if let Some(tool_calls) = delta.tool_calls {
            let mut named_new_call = false;
            let mut fragments = Vec::new();

            for tc_delta in tool_calls {
                let (name, arguments) = match tc_delta.function {
                    Some(function) => (function.name, function.arguments),
                    None => (None, None),
                };

                if let (Some(id), Some(name)) = (tc_delta.id, name) {
                    if !name.is_empty() && !self.turn_calls.contains_key(&tc_delta.index) {
                        self.turn_calls
                            .insert(tc_delta.index, ToolCallStart::new(id, name));
                        named_new_call = true;
                    }
                }

                if let Some(arguments) = arguments {
                    if !arguments.is_empty() {
                        fragments.push(ToolCallChunk::new(tc_delta.index as usize, arguments));
                    }
                }
            }

            if named_new_call {
                event.tool_calls = Some(self.turn_calls.values().cloned().collect());
            }
            if !fragments.is_empty() {
                event.tool_call_chunks = Some(fragments);
            }
        }

        if event == AssistantChunk::default() {
            None
        } else {
            Some(event)
        }
    }
}

/// Message of an in-band error object, or the whole object if it has none
fn upstream_error_message(error: &Value) -> String {
    error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

/// Turn the SSE lines of a completion stream into backend events
///
/// Ends after `[DONE]` or end of input. A read failure or an in-band
/// `error` payload yields one `BackendError::Stream` and ends the stream.
fn decode_sse_lines<S>(lines: S) -> BackendEventStream
where
    S: Stream<Item = std::io::Result<String>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut translator = ChunkTranslator::default();
        tokio::pin!(lines);

        while let Some(line_result) = lines.next().await {
            let line = match line_result {
                Ok(l) => l,
                Err(e) => {
                    yield Err(BackendError::Stream(e.to_string()));
                    break;
                }
            };

            let chunk_data = match parse_sse_line(&line) {
                SseLine::Data(data) => data,
                SseLine::Done => break,
                SseLine::Skip => continue,
            };

            let chunk: OpenAIStreamingChunk = match serde_json::from_str(chunk_data) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Failed to parse chunk: {}, error: {}", chunk_data, e);
                    continue;
                }
            };

            if let Some(upstream_error) = &chunk.error {
                let message = upstream_error_message(upstream_error);
                warn!("Upstream reported an error mid-stream: {}", message);
                yield Err(BackendError::Stream(message));
                break;
            }

            if let Some(event) = translator.translate(chunk) {
                yield Ok(BackendEvent::AssistantChunk(event));
            }
        }
    };

    Box::pin(stream)
}

#[async_trait]
impl Backend for OpenAIBackend {
    async fn stream_events(
        &self,
        messages: Vec<InputMessage>,
        conversation_id: &str,
    ) -> Result<BackendEventStream, BackendError> {
        let request = self.build_request(&messages, conversation_id);
        debug!(
            "Sending {} message(s) to {} for conversation {}",
            request.messages.len(),
            request.model,
            conversation_id
        );

        let response = self.send_stream_request(&request).await?;

        let byte_stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let reader = tokio_util::io::StreamReader::new(byte_stream);
        let lines = LinesStream::new(tokio::io::BufReader::new(reader).lines());

        Ok(decode_sse_lines(lines))
    }

    fn backend_name(&self) -> &str {
        if self.settings.api_version.is_some() {
            "Azure OpenAI"
        } else {
            "OpenAI"
        }
    }
}
