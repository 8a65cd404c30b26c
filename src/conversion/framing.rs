//! Data-stream line framing
//!
//! Every unit sent to the UI is a single `<tag>:<json>\n` line. JSON string
//! escaping guarantees no payload contains a raw newline.

use crate::core::constants::{finish, tag};
use serde::Serialize;
use serde_json::Value;

/// Token usage reported in the finish line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartMessagePayload<'a> {
    message_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallResultPayload<'a> {
    tool_call_id: &'a str,
    result: &'a Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartToolCallPayload<'a> {
    tool_call_id: &'a str,
    tool_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallArgsDeltaPayload<'a> {
    tool_call_id: &'a str,
    args_text_delta: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinishMessagePayload<'a> {
    finish_reason: &'a str,
    usage: Usage,
}

/// One line of the data-stream protocol
#[derive(Debug, Clone, PartialEq)]
pub enum WireLine {
    StartMessage { message_id: String },
    ToolCallResult { tool_call_id: String, result: Value },
    TextDelta(String),
    StartToolCall { tool_call_id: String, tool_name: String },
    ToolCallArgsDelta { tool_call_id: String, args_text_delta: String },
    FinishMessage { usage: Usage },
    Error(String),
}

impl WireLine {
    /// Protocol tag that prefixes this line
    pub fn tag(&self) -> &'static str {
        match self {
            WireLine::StartMessage { .. } => tag::START_MESSAGE,
            WireLine::ToolCallResult { .. } => tag::TOOL_CALL_RESULT,
            WireLine::TextDelta(_) => tag::TEXT_DELTA,
            WireLine::StartToolCall { .. } => tag::START_TOOL_CALL,
            WireLine::ToolCallArgsDelta { .. } => tag::TOOL_CALL_ARGS_DELTA,
            WireLine::FinishMessage { .. } => tag::FINISH_MESSAGE,
            WireLine::Error(_) => tag::ERROR,
        }
    }

    /// Whether this line ends the stream
    #[cfg(test)]
    pub fn is_terminal(&self) -> bool {
        matches!(self, WireLine::FinishMessage { .. } | WireLine::Error(_))
    }

    /// JSON encoding of the payload, keys in protocol order
    pub fn payload_json(&self) -> String {
        let encoded = match self {
            WireLine::StartMessage { message_id } => {
                serde_json::to_string(&StartMessagePayload { message_id })
            }
            WireLine::ToolCallResult {
                tool_call_id,
                result,
            } => serde_json::to_string(&ToolCallResultPayload {
                tool_call_id,
                result,
            }),
            WireLine::TextDelta(text) => serde_json::to_string(text),
            WireLine::StartToolCall {
                tool_call_id,
                tool_name,
            } => serde_json::to_string(&StartToolCallPayload {
                tool_call_id,
                tool_name,
            }),
            WireLine::ToolCallArgsDelta {
                tool_call_id,
                args_text_delta,
            } => serde_json::to_string(&ToolCallArgsDeltaPayload {
                tool_call_id,
                args_text_delta,
            }),
            WireLine::FinishMessage { usage } => serde_json::to_string(&FinishMessagePayload {
                finish_reason: finish::STOP,
                usage: *usage,
            }),
            WireLine::Error(message) => serde_json::to_string(message),
        };

        // Payloads are plain strings and `Value`s, neither of which can fail to encode.
        encoded.unwrap_or_else(|_| "null".to_string())
    }

    /// Full protocol line including the trailing newline
    pub fn to_line(&self) -> String {
        format!("{}:{}\n", self.tag(), self.payload_json())
    }
}
