//! Relay orchestration
//!
//! One controller invocation per client request: validate the conversation,
//! call the gateway, pre-check non-success envelopes, then drive the body
//! through reassembly, delta extraction, accumulation, and classification.
//! The first Blocked verdict is final for the request.
//!
//! Streamed forwarding follows the configured [`RelayMode`]: buffered mode
//! classifies the complete response before any byte reaches the client;
//! eager mode forwards frames as they are produced and can only cut the
//! stream short once a trigger is seen — bytes already flushed are gone.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::chat::{ChatMessage, RequestOptions, ensure_system_prompt};
use crate::config::{Config, RelayMode};
use crate::error::{RelayError, Result};
use crate::policy::{Inspect, Verdict};
use crate::relay::accumulator::Capture;
use crate::relay::delta;
use crate::relay::frames::{Frame, FrameReassembler, encode_data_frame, encode_done_frame};
use crate::upstream::{Envelope, Gateway, GatewayOptions, GenerateRequest};

/// How much upstream error body to keep in failure detail (logs only)
const MAX_FAILURE_DETAIL: usize = 512;

/// What one relay invocation produced
pub enum RelayOutcome {
    /// Fully buffered SSE exchange that classified clean. `frames` are the
    /// payloads to re-emit, `text` the accumulated assistant turn.
    Stream {
        frames: Vec<String>,
        text: String,
        truncated: bool,
    },
    /// Live SSE byte stream (eager mode); frames arrive as they are relayed
    Live(ReceiverStream<std::result::Result<Bytes, std::io::Error>>),
    /// Non-streamed completion: the upstream JSON body plus the extracted
    /// assistant turn
    Completion { body: String, text: String },
}

pub struct RelayController {
    gateway: Arc<dyn Gateway>,
    inspector: Arc<dyn Inspect>,
    config: Arc<Config>,
}

impl RelayController {
    pub fn new(gateway: Arc<dyn Gateway>, inspector: Arc<dyn Inspect>, config: Arc<Config>) -> Self {
        Self {
            gateway,
            inspector,
            config,
        }
    }

    /// Run one relay invocation end to end.
    ///
    /// Blocked content surfaces as [`RelayError::Blocked`]; the server maps
    /// it to the fixed 403 payload.
    pub async fn relay(
        &self,
        mut messages: Vec<ChatMessage>,
        options: RequestOptions,
    ) -> Result<RelayOutcome> {
        let relay_id = Uuid::new_v4();

        if messages.is_empty() {
            return Err(RelayError::InvalidRequest(
                "messages must not be empty".to_string(),
            ));
        }

        ensure_system_prompt(&mut messages, &self.config.relay.system_prompt);

        let stream = options.stream.unwrap_or(self.config.relay.stream);
        let request = GenerateRequest {
            messages,
            max_tokens: self.config.upstream.max_tokens,
            stream,
            gateway: self
                .config
                .upstream
                .gateway_id
                .as_ref()
                .map(|id| GatewayOptions {
                    id: id.clone(),
                    cache_ttl: options.cache_ttl,
                }),
        };

        tracing::debug!(relay = %relay_id, stream, "Calling upstream");
        let envelope = self.gateway.generate(request).await?;

        if !envelope.is_success() {
            return Err(self.pre_check_failure(relay_id, envelope).await);
        }

        if !stream {
            return self.relay_completion(relay_id, envelope).await;
        }

        match self.config.relay.mode {
            RelayMode::Buffered => self.relay_buffered(relay_id, envelope).await,
            RelayMode::Eager => Ok(self.relay_eager(relay_id, envelope)),
        }
    }

    /// Inspect a non-success envelope before anything is forwarded.
    ///
    /// A body carrying trigger terms means the gateway itself blocked the
    /// request; anything else is a generic upstream failure.
    async fn pre_check_failure(&self, relay_id: Uuid, envelope: Envelope) -> RelayError {
        let status = envelope.status;

        if !self.config.relay.pre_check {
            tracing::warn!(relay = %relay_id, status, "Upstream failure (pre-check disabled)");
            return RelayError::UpstreamFailure {
                status,
                detail: String::new(),
            };
        }

        let body = match envelope.collect_text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(relay = %relay_id, status, error = %e, "Failed to read upstream error body");
                return RelayError::UpstreamFailure {
                    status,
                    detail: e.to_string(),
                };
            }
        };

        if let Verdict::Blocked { reason } = self.inspector.classify(&body) {
            tracing::warn!(relay = %relay_id, status, %reason, "Upstream response blocked at pre-check");
            return RelayError::Blocked { reason };
        }

        let detail = truncate_detail(body);
        tracing::error!(relay = %relay_id, status, %detail, "Upstream failure");
        RelayError::UpstreamFailure { status, detail }
    }

    /// Non-streamed path: collect the JSON completion, classify it once,
    /// and hand the body back for passthrough.
    async fn relay_completion(&self, relay_id: Uuid, envelope: Envelope) -> Result<RelayOutcome> {
        let body = envelope.collect_text().await?;

        if let Verdict::Blocked { reason } = self.inspector.classify(&body) {
            tracing::warn!(relay = %relay_id, %reason, "Completion blocked");
            return Err(RelayError::Blocked { reason });
        }

        let text = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .as_ref()
            .and_then(delta::extract_from_value)
            .unwrap_or_default();

        tracing::debug!(relay = %relay_id, chars = text.len(), "Completion relayed");
        Ok(RelayOutcome::Completion { body, text })
    }

    /// Buffered streaming: consume the whole upstream stream, classifying
    /// the growing text after every delta, and only then release frames.
    /// The first Blocked verdict stops the read and nothing is forwarded.
    async fn relay_buffered(&self, relay_id: Uuid, envelope: Envelope) -> Result<RelayOutcome> {
        let mut body = envelope.body;
        let mut reassembler = FrameReassembler::new();
        let mut capture = Capture::new(self.config.relay.max_capture_bytes);
        let mut frames = Vec::new();

        'read: while let Some(chunk) = body.next().await {
            for frame in reassembler.push(&chunk?) {
                match frame {
                    Frame::Data(payload) => {
                        if let Some(text) = delta::extract(&payload) {
                            capture.push(&text);
                            if let Verdict::Blocked { reason } =
                                self.inspector.classify(capture.text())
                            {
                                tracing::warn!(relay = %relay_id, %reason, "Stream blocked mid-response");
                                return Err(RelayError::Blocked { reason });
                            }
                        }
                        frames.push(payload);
                    }
                    Frame::Done => break 'read,
                }
            }
        }

        if !reassembler.is_finished() {
            let discarded = reassembler.finish();
            if discarded > 0 {
                tracing::debug!(relay = %relay_id, discarded, "Discarding unterminated trailing bytes");
            }
        }

        tracing::debug!(
            relay = %relay_id,
            frames = frames.len(),
            chars = capture.len(),
            "Stream relayed"
        );

        let truncated = capture.truncated();
        Ok(RelayOutcome::Stream {
            frames,
            text: capture.into_text(),
            truncated,
        })
    }

    /// Eager streaming: forward each frame as soon as it is produced. The
    /// verdict check runs before the frame that completed a trigger is
    /// sent, so the triggering delta itself never leaves the relay; bytes
    /// from earlier frames have already been flushed and cannot be unsent.
    fn relay_eager(&self, relay_id: Uuid, envelope: Envelope) -> RelayOutcome {
        let (tx, rx) = mpsc::channel::<std::result::Result<Bytes, std::io::Error>>(16);

        let inspector = Arc::clone(&self.inspector);
        let blocked_message = self.config.relay.blocked_message.clone();
        let max_capture = self.config.relay.max_capture_bytes;
        let mut body = envelope.body;

        tokio::spawn(async move {
            let mut reassembler = FrameReassembler::new();
            let mut capture = Capture::new(max_capture);

            'read: while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::error!(relay = %relay_id, error = %e, "Transport fault mid-stream");
                        let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                        return;
                    }
                };

                for frame in reassembler.push(&chunk) {
                    match frame {
                        Frame::Data(payload) => {
                            if let Some(text) = delta::extract(&payload) {
                                capture.push(&text);
                                if let Verdict::Blocked { reason } =
                                    inspector.classify(capture.text())
                                {
                                    tracing::warn!(
                                        relay = %relay_id,
                                        %reason,
                                        forwarded = capture.len().saturating_sub(text.len()),
                                        "Stream blocked mid-response, cutting short"
                                    );
                                    let notice = serde_json::json!({
                                        "response": blocked_message,
                                        "error_code": "DLP_BLOCKED",
                                    });
                                    let _ =
                                        tx.send(Ok(encode_data_frame(&notice.to_string()))).await;
                                    let _ = tx.send(Ok(encode_done_frame())).await;
                                    return;
                                }
                            }
                            if tx.send(Ok(encode_data_frame(&payload))).await.is_err() {
                                tracing::debug!(relay = %relay_id, "Client disconnected, releasing upstream");
                                return;
                            }
                        }
                        Frame::Done => {
                            let _ = tx.send(Ok(encode_done_frame())).await;
                            break 'read;
                        }
                    }
                }

                if reassembler.is_finished() {
                    break;
                }
            }

            if !reassembler.is_finished() {
                let discarded = reassembler.finish();
                if discarded > 0 {
                    tracing::debug!(relay = %relay_id, discarded, "Discarding unterminated trailing bytes");
                }
                // Upstream closed without the sentinel; terminate the client
                // stream cleanly anyway.
                let _ = tx.send(Ok(encode_done_frame())).await;
            }

            tracing::debug!(relay = %relay_id, chars = capture.len(), "Stream relayed");
        });

        RelayOutcome::Live(ReceiverStream::new(rx))
    }
}

fn truncate_detail(mut body: String) -> String {
    if body.len() > MAX_FAILURE_DETAIL {
        let mut cut = MAX_FAILURE_DETAIL;
        while cut > 0 && !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
