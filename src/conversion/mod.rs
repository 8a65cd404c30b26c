//! Protocol conversion
//!
//! Inbound UI content to backend content, and backend events to the
//! line-delimited data-stream protocol.

pub mod data_url;
pub mod framing;
pub mod request_converter;
pub mod response_converter;
