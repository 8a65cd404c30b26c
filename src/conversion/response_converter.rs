//! Backend event stream to data-stream protocol conversion
//!
//! This module re-encodes the agent backend's event stream as the
//! line-delimited protocol the chat UI parses incrementally. It owns the
//! per-turn tool-call correlation state: the backend addresses argument
//! fragments by position within the latest tool-call batch, while the UI
//! expects them keyed by tool-call id.

use crate::conversion::framing::{Usage, WireLine};
use crate::core::backend::{Backend, BackendError};
use crate::models::backend::{AssistantChunk, BackendEvent, InputMessage, ToolCallChunk};
use futures::{Stream, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Positional index of the tool calls in the current assistant batch
///
/// Only ever replaced as a whole; each replacement bumps `version`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallOrderIndex {
    version: u64,
    ids: Vec<String>,
}

impl ToolCallOrderIndex {
    /// Swap in the ids of a new batch, discarding the previous positions
    pub fn replace(&mut self, ids: Vec<String>) {
        self.ids = ids;
        self.version += 1;
    }

    /// Tool call id at `position`, if the current batch has one
    pub fn resolve(&self, position: usize) -> Option<&str> {
        self.ids.get(position).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of batches seen so far
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Tool call tracking structure for streaming
#[derive(Debug, Clone)]
struct ToolCallState {
    name: String,
    args_buffer: String,
}

/// Stateful encoder for one streamed assistant turn
///
/// State is created empty per stream and dropped with it.
#[derive(Debug)]
pub struct StreamEventEncoder {
    message_id: String,
    accumulated_text: String,
    token_count: usize,
    tool_calls: HashMap<String, ToolCallState>,
    order: ToolCallOrderIndex,
}

impl Default for StreamEventEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamEventEncoder {
    pub fn new() -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            accumulated_text: String::new(),
            token_count: 0,
            tool_calls: HashMap::new(),
            order: ToolCallOrderIndex::default(),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    /// Whitespace-separated word count over all text deltas
    pub fn token_count(&self) -> usize {
        self.token_count
    }

    #[cfg(test)]
    pub fn order_index(&self) -> &ToolCallOrderIndex {
        &self.order
    }

    /// Arguments accumulated so far for a tool call
    #[cfg(test)]
    pub fn tool_call_args(&self, tool_call_id: &str) -> Option<&str> {
        self.tool_calls
            .get(tool_call_id)
            .map(|state| state.args_buffer.as_str())
    }

    /// Name a tool call was registered with
    #[cfg(test)]
    pub fn tool_call_name(&self, tool_call_id: &str) -> Option<&str> {
        self.tool_calls
            .get(tool_call_id)
            .map(|state| state.name.as_str())
    }

    /// First line of every stream
    pub fn start_message(&self) -> WireLine {
        WireLine::StartMessage {
            message_id: self.message_id.clone(),
        }
    }

    /// Lines produced by a single backend event, in emission order
    pub fn handle_event(&mut self, event: BackendEvent) -> Vec<WireLine> {
        match event {
            BackendEvent::ToolResult {
                tool_call_id,
                result,
            } => vec![WireLine::ToolCallResult {
                tool_call_id,
                result,
            }],
            BackendEvent::AssistantChunk(chunk) => self.handle_assistant_chunk(chunk),
        }
    }

    /// Terminal line for a stream that completed normally
    pub fn finish(&self) -> WireLine {
        // Both figures are the word count of the streamed text.
        WireLine::FinishMessage {
            usage: Usage {
                prompt_tokens: self.token_count,
                completion_tokens: self.token_count,
            },
        }
    }

    /// Terminal line for a stream that failed
    pub fn fail(&self, error: &dyn std::error::Error) -> WireLine {
        WireLine::Error(error.to_string())
    }

    fn handle_assistant_chunk(&mut self, chunk: AssistantChunk) -> Vec<WireLine> {
        let mut lines = Vec::new();

        if let Some(text) = chunk.text {
            if !text.is_empty() {
                self.token_count += text.split_whitespace().count();
                self.accumulated_text.push_str(&text);
                lines.push(WireLine::TextDelta(text));
            }
        }

        if let Some(batch) = chunk.tool_calls {
            // An empty batch carries no tool calls and leaves the index alone.
            if !batch.is_empty() {
                let mut positions = Vec::with_capacity(batch.len());

                for start in batch {
                    let name = start.name.unwrap_or_default();
                    if name.is_empty() {
                        continue;
                    }
                    let id = start.id.unwrap_or_else(|| Uuid::new_v4().to_string());
                    positions.push(id.clone());

                    if !self.tool_calls.contains_key(&id) {
                        self.tool_calls.insert(
                            id.clone(),
                            ToolCallState {
                                name: name.clone(),
                                args_buffer: String::new(),
                            },
                        );
                        lines.push(WireLine::StartToolCall {
                            tool_call_id: id,
                            tool_name: name,
                        });
                    }
                }

                self.order.replace(positions);
                debug!(
                    "Tool call batch {} indexed {} call(s)",
                    self.order.version(),
                    self.order.len()
                );
            }
        }

        if let Some(chunks) = chunk.tool_call_chunks {
            for fragment in chunks {
                if let Some(line) = self.apply_args_fragment(fragment) {
                    lines.push(line);
                }
            }
        }

        lines
    }

    /// Append an argument fragment to the tool call at its position
    ///
    /// Out-of-range positions, unknown ids and empty fragments yield nothing.
    fn apply_args_fragment(&mut self, fragment: ToolCallChunk) -> Option<WireLine> {
        let position = fragment.index.unwrap_or(0);
        let args = fragment.args.unwrap_or_default();

        let tool_call_id = match self.order.resolve(position) {
            Some(id) => id.to_string(),
            None => {
                debug!(
                    "Dropping args fragment at position {} ({} indexed)",
                    position,
                    self.order.len()
                );
                return None;
            }
        };

        if args.is_empty() {
            return None;
        }

        let state = self.tool_calls.get_mut(&tool_call_id)?;
        state.args_buffer.push_str(&args);

        Some(WireLine::ToolCallArgsDelta {
            tool_call_id,
            args_text_delta: args,
        })
    }
}

/// Encode a backend event stream as data-stream protocol lines
///
/// Yields the start line, one group of lines per event, then exactly one
/// finish or error line. Dropping the returned stream drops the backend
/// stream and all state without emitting anything further.
pub fn encode_backend_stream<S, E>(events: S) -> Pin<Box<dyn Stream<Item = String> + Send>>
where
    S: Stream<Item = Result<BackendEvent, E>> + Send + 'static,
    E: std::error::Error + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut encoder = StreamEventEncoder::new();
        debug!("Starting message {}", encoder.message_id());
        yield encoder.start_message().to_line();

        tokio::pin!(events);

        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    for line in encoder.handle_event(event) {
                        yield line.to_line();
                    }
                }
                Err(e) => {
                    error!("Backend stream failed for message {}: {}", encoder.message_id(), e);
                    yield encoder.fail(&e).to_line();
                    return;
                }
            }
        }

        info!(
            "Finished message {}: {} chars, {} tokens, {} tool call(s)",
            encoder.message_id(),
            encoder.accumulated_text().len(),
            encoder.token_count(),
            encoder.tool_calls.len()
        );
        yield encoder.finish().to_line();
    };

    Box::pin(stream)
}

/// Run one conversation turn on the backend and stream the encoded lines
///
/// The backend is not invoked until the start line has been consumed. A
/// failure to open the backend stream ends the output with an error line.
pub fn generate_stream(
    backend: Arc<dyn Backend>,
    messages: Vec<InputMessage>,
    conversation_id: String,
) -> Pin<Box<dyn Stream<Item = String> + Send>> {
    let events = futures::stream::once(async move {
        backend.stream_events(messages, &conversation_id).await
    })
    .try_flatten();

    encode_backend_stream::<_, BackendError>(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backend::ToolCallStart;
    use async_trait::async_trait;
    use serde_json::json;

    fn text(fragment: &str) -> BackendEvent {
        AssistantChunk::text(fragment).into()
    }

    fn batch(calls: &[(&str, &str)]) -> BackendEvent {
        AssistantChunk::tool_calls(
            calls
                .iter()
                .map(|(id, name)| ToolCallStart::new(*id, *name))
                .collect(),
        )
        .into()
    }

    fn args(index: usize, fragment: &str) -> BackendEvent {
        AssistantChunk::tool_call_chunks(vec![ToolCallChunk::new(index, fragment)]).into()
    }

    async fn collect_lines(events: Vec<Result<BackendEvent, BackendError>>) -> Vec<String> {
        encode_backend_stream(futures::stream::iter(events))
            .collect()
            .await
    }

    fn lines_with_tag<'a>(lines: &'a [String], tag: &str) -> Vec<&'a String> {
        let prefix = format!("{}:", tag);
        lines.iter().filter(|l| l.starts_with(&prefix)).collect()
    }

    #[test]
    fn test_order_index_replace_bumps_version() {
        let mut index = ToolCallOrderIndex::default();
        assert!(index.is_empty());
        index.replace(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(index.resolve(1), Some("b"));
        assert_eq!(index.version(), 1);

        index.replace(vec!["c".to_string()]);
        assert_eq!(index.resolve(0), Some("c"));
        assert_eq!(index.resolve(1), None);
        assert_eq!(index.version(), 2);
    }

    #[test]
    fn test_text_delta_emits_fragment_and_counts_words() {
        let mut encoder = StreamEventEncoder::new();
        let lines = encoder.handle_event(text("Hello  brave "));
        assert_eq!(lines, vec![WireLine::TextDelta("Hello  brave ".to_string())]);

        let lines = encoder.handle_event(text("new world"));
        assert_eq!(lines, vec![WireLine::TextDelta("new world".to_string())]);

        assert_eq!(encoder.accumulated_text(), "Hello  brave new world");
        assert_eq!(encoder.token_count(), 4);
        assert_eq!(
            encoder.finish(),
            WireLine::FinishMessage {
                usage: Usage {
                    prompt_tokens: 4,
                    completion_tokens: 4
                }
            }
        );
    }

    #[test]
    fn test_empty_text_is_silent() {
        let mut encoder = StreamEventEncoder::new();
        assert!(encoder.handle_event(text("")).is_empty());
        assert!(encoder.handle_event(AssistantChunk::default().into()).is_empty());
        assert_eq!(encoder.token_count(), 0);
    }

    #[test]
    fn test_tool_result_passes_through() {
        let mut encoder = StreamEventEncoder::new();
        let lines = encoder.handle_event(BackendEvent::ToolResult {
            tool_call_id: "unknown-is-fine".to_string(),
            result: json!("42"),
        });
        assert_eq!(
            lines,
            vec![WireLine::ToolCallResult {
                tool_call_id: "unknown-is-fine".to_string(),
                result: json!("42")
            }]
        );
    }

    #[test]
    fn test_empty_name_entries_take_no_position() {
        let mut encoder = StreamEventEncoder::new();
        let lines = encoder.handle_event(batch(&[("t1", "search"), ("", "")]));
        assert_eq!(
            lines,
            vec![WireLine::StartToolCall {
                tool_call_id: "t1".to_string(),
                tool_name: "search".to_string()
            }]
        );
        assert_eq!(encoder.order_index().len(), 1);

        let lines = encoder.handle_event(args(0, "{\"q\":"));
        assert_eq!(
            lines,
            vec![WireLine::ToolCallArgsDelta {
                tool_call_id: "t1".to_string(),
                args_text_delta: "{\"q\":".to_string()
            }]
        );

        assert!(encoder.handle_event(args(1, "x")).is_empty());
        assert_eq!(encoder.tool_call_args("t1"), Some("{\"q\":"));
    }

    #[test]
    fn test_repeated_ids_start_once() {
        let mut encoder = StreamEventEncoder::new();
        assert_eq!(encoder.handle_event(batch(&[("t1", "search")])).len(), 1);
        assert!(encoder.handle_event(batch(&[("t1", "search")])).is_empty());

        let lines = encoder.handle_event(batch(&[("t1", "search"), ("t2", "fetch")]));
        assert_eq!(
            lines,
            vec![WireLine::StartToolCall {
                tool_call_id: "t2".to_string(),
                tool_name: "fetch".to_string()
            }]
        );
        assert_eq!(encoder.tool_call_name("t1"), Some("search"));
    }

    #[test]
    fn test_known_id_is_not_reinitialized() {
        let mut encoder = StreamEventEncoder::new();
        encoder.handle_event(batch(&[("t1", "search")]));
        encoder.handle_event(args(0, "{\"q\":"));
        encoder.handle_event(batch(&[("t1", "renamed")]));
        encoder.handle_event(args(0, "\"rust\"}"));

        assert_eq!(encoder.tool_call_name("t1"), Some("search"));
        assert_eq!(encoder.tool_call_args("t1"), Some("{\"q\":\"rust\"}"));
    }

    #[test]
    fn test_new_batch_replaces_positions() {
        let mut encoder = StreamEventEncoder::new();
        encoder.handle_event(batch(&[("t1", "search"), ("t2", "fetch")]));
        encoder.handle_event(batch(&[("t3", "summarize")]));

        let lines = encoder.handle_event(args(0, "{}"));
        assert_eq!(
            lines,
            vec![WireLine::ToolCallArgsDelta {
                tool_call_id: "t3".to_string(),
                args_text_delta: "{}".to_string()
            }]
        );
        assert!(encoder.handle_event(args(1, "{}")).is_empty());
        assert_eq!(encoder.tool_call_args("t2"), Some(""));
    }

    #[test]
    fn test_args_before_any_batch_are_dropped() {
        let mut encoder = StreamEventEncoder::new();
        assert!(encoder.handle_event(args(0, "{}")).is_empty());
    }

    #[test]
    fn test_empty_args_and_missing_index() {
        let mut encoder = StreamEventEncoder::new();
        encoder.handle_event(batch(&[("t1", "search")]));
        assert!(encoder.handle_event(args(0, "")).is_empty());

        let lines = encoder.handle_event(
            AssistantChunk::tool_call_chunks(vec![ToolCallChunk {
                index: None,
                args: Some("{".to_string()),
            }])
            .into(),
        );
        assert_eq!(lines.len(), 1);
        assert_eq!(encoder.tool_call_args("t1"), Some("{"));
    }

    #[test]
    fn test_missing_id_gets_generated() {
        let mut encoder = StreamEventEncoder::new();
        let lines = encoder.handle_event(
            AssistantChunk::tool_calls(vec![ToolCallStart {
                id: None,
                name: Some("search".to_string()),
            }])
            .into(),
        );
        match &lines[..] {
            [WireLine::StartToolCall { tool_call_id, .. }] => {
                assert!(Uuid::parse_str(tool_call_id).is_ok());
                assert_eq!(encoder.order_index().resolve(0), Some(tool_call_id.as_str()));
            }
            other => panic!("unexpected lines: {:?}", other),
        }
    }

    #[test]
    fn test_empty_string_id_is_kept() {
        let mut encoder = StreamEventEncoder::new();
        let lines = encoder.handle_event(batch(&[("", "search")]));
        assert_eq!(
            lines,
            vec![WireLine::StartToolCall {
                tool_call_id: String::new(),
                tool_name: "search".to_string()
            }]
        );

        let lines = encoder.handle_event(args(0, "{}"));
        assert_eq!(
            lines,
            vec![WireLine::ToolCallArgsDelta {
                tool_call_id: String::new(),
                args_text_delta: "{}".to_string()
            }]
        );
    }

    #[test]
    fn test_single_chunk_emits_text_then_starts_then_args() {
        let mut encoder = StreamEventEncoder::new();
        let lines = encoder.handle_event(
            AssistantChunk {
                text: Some("Looking".to_string()),
                tool_calls: Some(vec![ToolCallStart::new("t1", "search")]),
                tool_call_chunks: Some(vec![ToolCallChunk::new(0, "{}")]),
            }
            .into(),
        );
        let tags: Vec<&str> = lines.iter().map(WireLine::tag).collect();
        assert_eq!(tags, vec!["0", "b", "c"]);
    }

    #[test]
    fn test_empty_batch_keeps_positions() {
        let mut encoder = StreamEventEncoder::new();
        encoder.handle_event(batch(&[("t1", "search")]));
        encoder.handle_event(AssistantChunk::tool_calls(Vec::new()).into());
        assert_eq!(encoder.handle_event(args(0, "{}")).len(), 1);
    }

    #[tokio::test]
    async fn test_stream_scenario_with_out_of_range_fragment() {
        let lines = collect_lines(vec![
            Ok(batch(&[("t1", "search"), ("", "")])),
            Ok(args(0, "{\"q\":")),
            Ok(args(1, "x")),
        ])
        .await;

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("f:{\"messageId\":\""));
        assert_eq!(lines[1], "b:{\"toolCallId\":\"t1\",\"toolName\":\"search\"}\n");
        assert_eq!(
            lines[2],
            "c:{\"toolCallId\":\"t1\",\"argsTextDelta\":\"{\\\"q\\\":\"}\n"
        );
        assert_eq!(
            lines[3],
            "d:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":0,\"completionTokens\":0}}\n"
        );
    }

    #[tokio::test]
    async fn test_stream_error_replaces_finish() {
        let lines = collect_lines(vec![
            Ok(text("partial")),
            Err(BackendError::Stream("connection reset".to_string())),
            Ok(text("never sent")),
        ])
        .await;

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("f:"));
        assert_eq!(lines[1], "0:\"partial\"\n");
        assert_eq!(lines[2], "3:\"Stream error: connection reset\"\n");
        assert!(lines_with_tag(&lines, "d").is_empty());
    }

    #[tokio::test]
    async fn test_empty_backend_stream_still_terminates() {
        let lines = collect_lines(Vec::new()).await;
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("f:"));
        assert!(lines[1].starts_with("d:"));
    }

    #[tokio::test]
    async fn test_full_turn_framing_invariants() {
        let lines = collect_lines(vec![
            Ok(text("Let me search.")),
            Ok(batch(&[("t1", "search")])),
            Ok(args(0, "{\"q\":")),
            Ok(batch(&[("t1", "search")])),
            Ok(args(0, "\"rust\"}")),
            Ok(BackendEvent::ToolResult {
                tool_call_id: "t1".to_string(),
                result: json!({"hits": 3}),
            }),
            Ok(text("Found three results.")),
        ])
        .await;

        assert_eq!(lines_with_tag(&lines, "f").len(), 1);
        assert!(lines[0].starts_with("f:"));
        assert_eq!(lines_with_tag(&lines, "b").len(), 1);
        assert_eq!(lines_with_tag(&lines, "c").len(), 2);
        assert_eq!(
            lines_with_tag(&lines, "a"),
            vec!["a:{\"toolCallId\":\"t1\",\"result\":{\"hits\":3}}\n"]
        );
        assert!(lines.iter().all(|l| l.ends_with('\n') && l.matches('\n').count() == 1));
        assert_eq!(
            lines.last().unwrap(),
            "d:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":6,\"completionTokens\":6}}\n"
        );
    }

    #[tokio::test]
    async fn test_each_stream_gets_fresh_message_id() {
        let first = collect_lines(Vec::new()).await;
        let second = collect_lines(Vec::new()).await;
        assert_ne!(first[0], second[0]);
    }

    struct ScriptedBackend {
        events: Vec<Result<BackendEvent, BackendError>>,
        open_error: Option<String>,
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn stream_events(
            &self,
            _messages: Vec<InputMessage>,
            _conversation_id: &str,
        ) -> Result<crate::core::backend::BackendEventStream, BackendError> {
            if let Some(message) = &self.open_error {
                return Err(BackendError::Unexpected(message.clone()));
            }
            Ok(Box::pin(futures::stream::iter(self.events.clone())))
        }

        fn backend_name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_generate_stream_runs_backend() {
        let backend = Arc::new(ScriptedBackend {
            events: vec![Ok(text("hi there"))],
            open_error: None,
        });
        let lines: Vec<String> =
            generate_stream(backend, Vec::new(), "conv-1".to_string())
                .collect()
                .await;

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "0:\"hi there\"\n");
        assert!(lines[2].contains("\"promptTokens\":2"));
    }

    #[tokio::test]
    async fn test_generate_stream_open_failure_is_error_line() {
        let backend = Arc::new(ScriptedBackend {
            events: Vec::new(),
            open_error: Some("agent unavailable".to_string()),
        });
        let lines: Vec<String> =
            generate_stream(backend, Vec::new(), "conv-1".to_string())
                .collect()
                .await;

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("f:"));
        assert_eq!(lines[1], "3:\"Unexpected error: agent unavailable\"\n");
    }

    #[tokio::test]
    async fn test_abandoned_stream_emits_nothing_more() {
        let backend = Arc::new(ScriptedBackend {
            events: vec![Ok(text("one")), Ok(text("two"))],
            open_error: None,
        });
        let mut stream = generate_stream(backend, Vec::new(), "conv-1".to_string());
        let first = stream.next().await.unwrap();
        assert!(first.starts_with("f:"));
        drop(stream);
    }
}
