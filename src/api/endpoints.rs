//! API endpoint handlers
//!
//! This module implements the HTTP endpoints of the adapter: chat
//! submissions that stream the data-stream protocol back, plus service
//! info and health checks.

use crate::conversion::request_converter::convert_chat_request;
use crate::conversion::response_converter::generate_stream;
use crate::core::backend::Backend;
use crate::core::config::Config;
use crate::core::constants::header;
use crate::models::ui::ChatRequest;
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header as http_header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Arc<dyn Backend>,
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/chat", post(new_chat))
        .route("/conversations/{conversation_id}/chat", post(continue_chat))
        .with_state(state)
}

/// Validate API key from request headers
fn validate_api_key(headers: &HeaderMap, config: &Config) -> Result<(), StatusCode> {
    // Skip validation if no client key is configured
    if config.client_api_key.is_none() {
        return Ok(());
    }

    let client_api_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(http_header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        });

    match client_api_key {
        Some(key) if config.validate_client_api_key(key) => Ok(()),
        _ => {
            warn!("Invalid API key provided by client");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// POST /chat - Start a new conversation
async fn new_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response, StatusCode> {
    validate_api_key(&headers, &state.config)?;

    let conversation_id = uuid::Uuid::new_v4().to_string();
    info!("📥 New conversation {}", conversation_id);

    Ok(stream_chat(&state, conversation_id, &request))
}

/// POST /conversations/{conversation_id}/chat - Continue a conversation
async fn continue_chat(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response, StatusCode> {
    validate_api_key(&headers, &state.config)?;

    info!(
        "📥 Chat for conversation {}: {} message(s)",
        conversation_id,
        request.messages.len()
    );

    Ok(stream_chat(&state, conversation_id, &request))
}

/// Translate the submission and stream the backend's turn as protocol lines
fn stream_chat(state: &AppState, conversation_id: String, request: &ChatRequest) -> Response {
    let messages = match convert_chat_request(request) {
        Ok(messages) => messages,
        Err(e) => {
            warn!("Rejected chat request for {}: {}", conversation_id, e);
            let error_response = json!({
                "type": "error",
                "error": {
                    "type": "invalid_request_error",
                    "message": e.to_string()
                }
            });
            return (StatusCode::BAD_REQUEST, Json(error_response)).into_response();
        }
    };

    debug!(
        "Streaming turn for {} via {}",
        conversation_id,
        state.backend.backend_name()
    );

    let conversation_header = HeaderValue::from_str(&conversation_id).ok();
    let lines = generate_stream(state.backend.clone(), messages, conversation_id);
    let mut response = Body::from_stream(lines.map(Ok::<_, Infallible>)).into_response();

    let response_headers = response.headers_mut();
    response_headers.insert(
        http_header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response_headers.insert(
        header::DATA_STREAM,
        HeaderValue::from_static(header::DATA_STREAM_VERSION),
    );
    response_headers.insert(http_header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Some(value) = conversation_header {
        response_headers.insert(header::CONVERSATION_ID, value);
    }

    response
}

/// GET / - Root endpoint
async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "message": "Chat Stream Adapter v0.1.0",
        "status": "running",
        "backend": state.backend.backend_name(),
        "client_api_key_validation": state.config.client_api_key.is_some(),
        "endpoints": {
            "chat": "/chat",
            "conversation_chat": "/conversations/{conversation_id}/chat",
            "health": "/health",
        },
    }))
}

/// GET /health - Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "backend": state.backend.backend_name(),
        "backend_configured": state.config.validate_backend(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backends::MockBackend;
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt; // for oneshot

    fn app(config_toml: &str) -> Router {
        let config = Config::from_toml_str(config_toml).unwrap();
        create_router(AppState {
            config: Arc::new(config),
            backend: Arc::new(MockBackend::new(Duration::ZERO)),
        })
    }

    fn json_request(path: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn user_text(text: &str) -> Value {
        json!({"messages": [{"role": "user", "content": [{"type": "text", "text": text}]}]})
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = app(r#"backend = "mock""#)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["backend"], "Mock");
    }

    #[tokio::test]
    async fn test_new_chat_streams_protocol_lines() {
        let response = app(r#"backend = "mock""#)
            .oneshot(json_request("/chat", user_text("hello there")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::DATA_STREAM], "v1");
        assert!(
            uuid::Uuid::parse_str(
                response.headers()[header::CONVERSATION_ID].to_str().unwrap()
            )
            .is_ok()
        );

        let body = body_text(response).await;
        let lines: Vec<&str> = body.lines().collect();
        assert!(lines[0].starts_with("f:{\"messageId\":"));
        assert_eq!(
            &lines[1..lines.len() - 1],
            &["0:\"You said: \"", "0:\"hello \"", "0:\"there\""]
        );
        assert_eq!(
            lines[lines.len() - 1],
            "d:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":4,\"completionTokens\":4}}"
        );
    }

    #[tokio::test]
    async fn test_conversation_chat_with_attachment() {
        let request = json!({"messages": [{"role": "user", "content": [
            {"type": "file", "data": "data:text/csv;base64,QUJD,filename:a%20b.csv"},
            {"type": "reasoning", "text": "ignored"}
        ]}]});
        let response = app(r#"backend = "mock""#)
            .oneshot(json_request("/conversations/conv-42/chat", request))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONVERSATION_ID], "conv-42");

        let body = body_text(response).await;
        assert!(body.contains(
            "b:{\"toolCallId\":\"call_conv42_0\",\"toolName\":\"inspect_attachment\"}\n"
        ));
        assert!(body.contains("a:{\"toolCallId\":\"call_conv42_0\",\"result\":{\"bytes\":3,"));
        assert_eq!(body.matches("\nc:").count(), 2);
        assert!(body.ends_with("}}\n"));
    }

    #[tokio::test]
    async fn test_malformed_attachment_is_rejected() {
        let request = json!({"messages": [{"role": "user", "content": [
            {"type": "image", "image": "not-a-data-url"}
        ]}]});
        let response = app(r#"backend = "mock""#)
            .oneshot(json_request("/chat", request))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn test_untyped_blocks_are_skipped() {
        let request = json!({"messages": [{"role": "user", "content": [
            {"text": "no kind"},
            {"type": "text", "text": "kept"}
        ]}]});
        let response = app(r#"backend = "mock""#)
            .oneshot(json_request("/chat", request))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("0:\"kept\"\n"));
        assert!(!body.contains("no kind"));
    }

    #[tokio::test]
    async fn test_missing_user_message_is_rejected() {
        let response = app(r#"backend = "mock""#)
            .oneshot(json_request("/chat", json!({"messages": []})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_client_api_key_required_when_configured() {
        let config = "backend = \"mock\"\nclient_api_key = \"secret\"";

        let response = app(config)
            .oneshot(json_request("/chat", user_text("hi")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut request = json_request("/chat", user_text("hi"));
        request
            .headers_mut()
            .insert("authorization", HeaderValue::from_static("Bearer secret"));
        let response = app(config).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
