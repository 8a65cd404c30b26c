//! Constants for roles, wire-protocol tags and response headers
//!
//! This module defines string constants shared by the converters, the
//! backends and the HTTP layer.

/// Message role constants
pub mod role {
    /// User role identifier
    pub const USER: &str = "user";
}

/// Line prefixes of the data-stream wire protocol
pub mod tag {
    /// Start of the assistant message
    pub const START_MESSAGE: &str = "f";

    /// Result of a tool call
    pub const TOOL_CALL_RESULT: &str = "a";

    /// Incremental assistant text
    pub const TEXT_DELTA: &str = "0";

    /// First sighting of a tool call
    pub const START_TOOL_CALL: &str = "b";

    /// Incremental tool-call arguments
    pub const TOOL_CALL_ARGS_DELTA: &str = "c";

    /// Normal completion with usage
    pub const FINISH_MESSAGE: &str = "d";

    /// Terminal failure
    pub const ERROR: &str = "3";
}

/// Finish reason constants
pub mod finish {
    /// Normal end of stream
    pub const STOP: &str = "stop";
}

/// Response header names and values
pub mod header {
    /// Marks a body as the data-stream protocol
    pub const DATA_STREAM: &str = "x-vercel-ai-data-stream";

    /// Protocol version advertised in `DATA_STREAM`
    pub const DATA_STREAM_VERSION: &str = "v1";

    /// Conversation id assigned by `POST /chat`
    pub const CONVERSATION_ID: &str = "x-conversation-id";
}
