//! Upstream gateway client
//!
//! A single outbound operation: `generate` a completion for a message list,
//! returning the response envelope (status + headers + unread byte stream).
//! The trait is the collaborator seam — the production implementation talks
//! to an HTTP gateway via reqwest, tests substitute canned envelopes.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use url::Url;

use crate::chat::ChatMessage;
use crate::config::UpstreamConfig;
use crate::error::{RelayError, Result};

/// Inputs for one generation call
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub stream: bool,
    /// Gateway-side options, forwarded opaque to the model itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayOptions>,
}

/// Options interpreted by the gateway rather than the model
#[derive(Debug, Clone, Serialize)]
pub struct GatewayOptions {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<u64>,
}

/// Body chunks as they arrive off the wire
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// Response envelope: status and headers are available before any body
/// byte has been read.
pub struct Envelope {
    pub status: u16,
    pub headers: axum::http::HeaderMap,
    pub body: BodyStream,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body into text (lossy UTF-8). Used for pre-check
    /// inspection of error bodies and for non-streamed completions.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// The generation gateway collaborator
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<Envelope>;
}

/// HTTP gateway client over reqwest
pub struct GatewayClient {
    client: reqwest::Client,
    endpoint: Url,
    api_token: Option<String>,
}

impl GatewayClient {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base = Url::parse(&config.url)
            .map_err(|e| RelayError::Config(format!("Invalid gateway URL: {e}")))?;
        let endpoint = join_model_path(&base, &config.model_id)?;

        Ok(Self {
            client,
            endpoint,
            api_token: config.api_token.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Model ids carry literal slashes (`@cf/meta/...`), which must survive
/// into the request path unencoded.
fn join_model_path(base: &Url, model_id: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        model_id.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| RelayError::Config(format!("Invalid gateway endpoint: {e}")))
}

#[async_trait]
impl Gateway for GatewayClient {
    async fn generate(&self, request: GenerateRequest) -> Result<Envelope> {
        tracing::debug!(
            endpoint = %self.endpoint,
            stream = request.stream,
            messages = request.messages.len(),
            "Calling generation gateway"
        );

        let mut builder = self.client.post(self.endpoint.clone()).json(&request);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RelayError::Network(format!("Request timed out: {e}"))
            } else if e.is_connect() {
                RelayError::Network(format!("Failed to connect to upstream: {e}"))
            } else {
                RelayError::Network(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| RelayError::Network(format!("Stream read failed: {e}")))
            })
            .boxed();

        Ok(Envelope {
            status,
            headers,
            body,
        })
    }
}
