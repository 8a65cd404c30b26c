//! Core application modules
//!
//! This module contains configuration, constants, logging, and the agent
//! backend abstraction with its implementations.

pub mod backend;
pub mod backends;
pub mod config;
pub mod constants;
pub mod logging;
