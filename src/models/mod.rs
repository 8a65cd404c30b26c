//! API data models
//!
//! This module contains data structures for the chat UI, the agent backend,
//! and the OpenAI chat-completions API.

pub mod backend;
pub mod openai;
pub mod ui;
