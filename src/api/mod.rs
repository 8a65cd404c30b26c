//! HTTP API

pub mod endpoints;
