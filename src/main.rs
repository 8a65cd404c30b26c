//! Chat Stream Adapter
//!
//! This application sits between a chat UI and an agent backend. It turns
//! UI submissions (text plus data-URL attachments) into agent input and
//! re-encodes the agent's streamed events as data-stream protocol lines.

mod api;
mod conversion;
mod core;
mod models;

use crate::api::endpoints::{AppState, create_router};
use crate::core::backend::{Backend, BackendType};
use crate::core::backends::{MockBackend, OpenAIBackend};
use crate::core::config::Config;
use crate::core::logging::init_logging;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Check for --help flag
    if std::env::args().any(|arg| arg == "--help") {
        print_help();
        return;
    }

    dotenv::dotenv().ok();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            eprintln!("Configuration Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config.log_level);

    // Print startup banner
    print_startup_banner(&config);

    // Validate backend credentials
    if !config.validate_backend() {
        error!("Invalid credentials for backend: {:?}", config.backend);
        std::process::exit(1);
    }

    // Create backend based on configuration
    let backend: Arc<dyn Backend> = match config.backend {
        BackendType::OpenAI => {
            let Some(settings) = config.openai.clone() else {
                error!("OpenAI backend selected without an [openai] section");
                std::process::exit(1);
            };
            match OpenAIBackend::new(settings) {
                Ok(backend) => Arc::new(backend),
                Err(e) => {
                    error!("Failed to create OpenAI backend: {}", e);
                    std::process::exit(1);
                }
            }
        }
        BackendType::Mock => Arc::new(MockBackend::new(config.mock_delay)),
    };

    info!("Using backend: {}", backend.backend_name());

    // Create application state
    let app_state = AppState {
        config: config.clone(),
        backend,
    };

    // Create router
    let app = create_router(app_state);

    // Bind to address
    let addr = format!("{}:{}", config.host, config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Server listening on http://{}", addr);

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Print startup banner with configuration
fn print_startup_banner(config: &Config) {
    for line in startup_banner(config) {
        println!("{}", line);
    }
    println!();
}

/// Banner lines describing the loaded configuration
fn startup_banner(config: &Config) -> Vec<String> {
    let mut lines = vec![
        "🚀 Chat Stream Adapter v0.1.0".to_string(),
        "✅ Configuration loaded successfully".to_string(),
        format!("   Backend: {:?}", config.backend),
    ];

    match config.backend {
        BackendType::OpenAI => {
            if let Some(openai) = &config.openai {
                lines.push(format!("   Base URL: {}", openai.base_url));
                lines.push(format!("   Model: {}", openai.model));
                if let Some(version) = &openai.api_version {
                    lines.push(format!("   Azure API Version: {}", version));
                }
            }
        }
        BackendType::Mock => {
            lines.push(format!("   Mock Delay: {}ms", config.mock_delay.as_millis()));
        }
    }

    lines.push(format!("   Request Timeout: {}s", config.request_timeout));
    lines.push(format!("   Server: {}:{}", config.host, config.port));
    lines.push(format!(
        "   Client API Key Validation: {}",
        if config.client_api_key.is_some() {
            "Enabled"
        } else {
            "Disabled"
        }
    ));
    lines
}

/// Print help message
fn print_help() {
    println!("Chat Stream Adapter v0.1.0");
    println!();
    println!("Usage: chat-stream-adapter [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --help    Display this help message");
    println!();
    println!("Environment variables:");
    println!("  CONFIG_PATH - Path to the TOML configuration (default: config.toml)");
    println!("  RUST_LOG - Overrides the configured log level");
    println!();
    println!("Configuration file:");
    println!("  backend = \"openai\" | \"mock\"");
    println!("  client_api_key - Key clients must send via x-api-key or Bearer (optional)");
    println!("  [openai] api_key, base_url, azure_api_version, model, temperature");
    println!("  [mock] delay_ms - Pause between scripted events (default: 20)");
    println!("  [server] host (default: 0.0.0.0), port (default: 8000), log_level (default: info)");
    println!("  [request] request_timeout - Seconds (default: 90)");
    println!();
    println!("Routes:");
    println!("  POST /chat                                  Start a conversation");
    println!("  POST /conversations/{{conversation_id}}/chat  Continue a conversation");
    println!("  GET  /health                                Health check");
}
