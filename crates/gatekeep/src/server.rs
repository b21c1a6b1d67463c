//! HTTP server surface
//!
//! One inbound endpoint, `POST /api/chat`, plus a health check. Static
//! assets and everything browser-side are other components' concern; any
//! unmatched path gets a JSON 404. The handler maps relay outcomes onto
//! the wire contract: SSE on success, fixed 403 JSON on block, 400 on bad
//! requests, generic 500 otherwise.

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::Response,
    routing::{get, post},
};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::chat::ChatRequest;
use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::policy::{Inspect, KeywordInspector};
use crate::relay::{RelayController, RelayOutcome, encode_data_frame, encode_done_frame};
use crate::upstream::{Gateway, GatewayClient};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<dyn Gateway>,
    pub inspector: Arc<dyn Inspect>,
}

/// The relay server
pub struct RelayServer {
    config: Config,
}

impl RelayServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start the server and listen for requests
    pub async fn serve(&self) -> Result<()> {
        let config = Arc::new(self.config.clone());
        let gateway = Arc::new(GatewayClient::from_config(&config.upstream)?);
        let inspector = Arc::new(KeywordInspector::from_config(&config.policy));

        tracing::info!(endpoint = %gateway.endpoint(), "Relaying to gateway");

        let state = Arc::new(AppState {
            config: Arc::clone(&config),
            gateway,
            inspector,
        });

        let app = create_router(state);

        let addr: SocketAddr = config
            .server
            .listen_addr
            .parse()
            .map_err(|e| RelayError::Config(format!("Invalid listen address: {e}")))?;

        tracing::info!("Starting relay server on {addr}");

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Config(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| RelayError::Network(format!("Server error: {e}")))?;

        tracing::info!("Relay server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint - returns JSON status
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn not_found_handler() -> Response<Body> {
    create_error_response(StatusCode::NOT_FOUND, "not_found", "No such endpoint")
}

/// Handle `POST /api/chat`: parse, relay, map the outcome onto the wire.
async fn chat_handler(State(state): State<Arc<AppState>>, body: bytes::Bytes) -> Response<Body> {
    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting malformed chat request");
            return create_error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                &format!("Invalid request body: {e}"),
            );
        }
    };

    let controller = RelayController::new(
        Arc::clone(&state.gateway),
        Arc::clone(&state.inspector),
        Arc::clone(&state.config),
    );

    match controller.relay(request.messages, request.options).await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => error_response(&state, e),
    }
}

fn outcome_response(outcome: RelayOutcome) -> Response<Body> {
    match outcome {
        RelayOutcome::Stream { frames, .. } => {
            let mut body = BytesMut::new();
            for payload in &frames {
                body.extend_from_slice(&encode_data_frame(payload));
            }
            body.extend_from_slice(&encode_done_frame());
            sse_response(Body::from(body.freeze()))
        }
        RelayOutcome::Live(stream) => sse_response(Body::from_stream(stream)),
        RelayOutcome::Completion { body, .. } => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap_or_else(|_| fallback_response(StatusCode::INTERNAL_SERVER_ERROR)),
    }
}

fn sse_response(body: Body) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|_| fallback_response(StatusCode::INTERNAL_SERVER_ERROR))
}

fn error_response(state: &AppState, error: RelayError) -> Response<Body> {
    match error {
        RelayError::InvalidRequest(message) => {
            create_error_response(StatusCode::BAD_REQUEST, "invalid_request", &message)
        }
        RelayError::Blocked { reason } => {
            tracing::warn!(%reason, "Returning blocked notice");
            let body = serde_json::json!({
                "response": state.config.relay.blocked_message,
                "error_code": "DLP_BLOCKED",
            });
            Response::builder()
                .status(StatusCode::FORBIDDEN)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap_or_else(|_| fallback_response(StatusCode::FORBIDDEN))
        }
        // Detail stays in the logs; the client gets a generic message
        other => {
            tracing::error!(category = other.category(), error = %other, "Relay failed");
            create_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "relay_error",
                "The relay failed to process the request",
            )
        }
    }
}

/// Create a JSON error response
fn create_error_response(status: StatusCode, error_type: &str, message: &str) -> Response<Body> {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
        }
    });

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| fallback_response(StatusCode::INTERNAL_SERVER_ERROR))
}

fn fallback_response(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .unwrap()
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
