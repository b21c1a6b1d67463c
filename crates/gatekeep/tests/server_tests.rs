//! End-to-end relay tests against a mock gateway
//!
//! Drives the real router + gateway client against a wiremock upstream and
//! asserts the wire contract: SSE passthrough on success, the fixed 403
//! payload on block, 400 on bad requests, generic 500 on upstream failure.

use std::sync::Arc;

use axum::{Router, body::Body, http::Request};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gatekeep::config::{Config, RelayMode};
use gatekeep::policy::{Inspect, KeywordInspector};
use gatekeep::server::{AppState, create_router};
use gatekeep::upstream::{Gateway, GatewayClient};

fn test_config(upstream_url: &str) -> Config {
    let mut config = Config::default();
    config.upstream.url = upstream_url.to_string();
    config.upstream.model_id = "test-model".to_string();
    config.upstream.timeout_secs = 5;
    config
}

fn build_app(config: Config) -> Router {
    let config = Arc::new(config);
    let gateway =
        Arc::new(GatewayClient::from_config(&config.upstream).unwrap()) as Arc<dyn Gateway>;
    let inspector = Arc::new(KeywordInspector::from_config(&config.policy)) as Arc<dyn Inspect>;

    create_router(Arc::new(AppState {
        config,
        gateway,
        inspector,
    }))
}

fn chat_body(content: &str) -> String {
    serde_json::json!({
        "messages": [{"role": "user", "content": content}]
    })
    .to_string()
}

async fn post_chat(app: Router, body: String) -> axum::http::Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

async fn body_string(response: axum::http::Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

const HAPPY_SSE: &str =
    "data: {\"response\":\"Hi\"}\n\ndata: {\"response\":\" there\"}\n\ndata: [DONE]\n\n";

mod streaming_success_tests {
    use super::*;

    #[tokio::test]
    async fn test_streamed_response_relayed_with_sse_contract() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test-model"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(HAPPY_SSE, "text/event-stream"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let app = build_app(test_config(&mock_server.uri()));
        let response = post_chat(app, chat_body("hello")).await;

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        assert_eq!(
            response.headers().get("cache-control").unwrap(),
            "no-cache"
        );

        let body = body_string(response).await;
        assert!(body.contains("data: {\"response\":\"Hi\"}"));
        assert!(body.contains("data: {\"response\":\" there\"}"));
        assert!(body.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn test_frames_split_across_network_reads_still_relay() {
        // The whole exchange delivered as one body; boundary handling is
        // exercised exhaustively in relay_tests. Here the interesting part
        // is that a payload fragmented mid-JSON still produces one frame.
        let sse = "data: {\"respon";
        let sse_rest = "se\":\"ok\"}\n\ndata: [DONE]\n\n";
        let full = format!("{sse}{sse_rest}");

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test-model"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(full, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let app = build_app(test_config(&mock_server.uri()));
        let response = post_chat(app, chat_body("hello")).await;

        assert_eq!(response.status(), 200);
        let body = body_string(response).await;
        assert!(body.contains("data: {\"response\":\"ok\"}"));
    }

    #[tokio::test]
    async fn test_request_carries_system_prompt_and_stream_flag() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test-model"))
            .and(body_partial_json(serde_json::json!({
                "stream": true,
                "messages": [{"role": "system"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(HAPPY_SSE, "text/event-stream"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let app = build_app(test_config(&mock_server.uri()));
        let response = post_chat(app, chat_body("hello")).await;

        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_eager_mode_relays_frames_live() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test-model"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(HAPPY_SSE, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let mut config = test_config(&mock_server.uri());
        config.relay.mode = RelayMode::Eager;
        let app = build_app(config);

        let response = post_chat(app, chat_body("hello")).await;

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        let body = body_string(response).await;
        assert!(body.contains("data: {\"response\":\"Hi\"}"));
        assert!(body.ends_with("data: [DONE]\n\n"));
    }
}

mod blocked_tests {
    use super::*;

    #[tokio::test]
    async fn test_upstream_403_with_trigger_body_yields_fixed_payload() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test-model"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_raw(r#"{"error":"blocked by policy"}"#, "application/json"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let app = build_app(test_config(&mock_server.uri()));
        let response = post_chat(app, chat_body("hello")).await;

        assert_eq!(response.status(), 403);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );

        let body = body_string(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error_code"], "DLP_BLOCKED");
        assert!(json["response"].as_str().unwrap().contains("blocked"));
        // No stream bytes reached the client
        assert!(!body.contains("data:"));
    }

    #[tokio::test]
    async fn test_mid_stream_trigger_yields_403_in_buffered_mode() {
        let sse = "data: {\"response\":\"Leaking \"}\n\ndata: {\"response\":\"sensitive records\"}\n\ndata: [DONE]\n\n";

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test-model"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let app = build_app(test_config(&mock_server.uri()));
        let response = post_chat(app, chat_body("hello")).await;

        assert_eq!(response.status(), 403);
        let body = body_string(response).await;
        assert!(body.contains("DLP_BLOCKED"));
        assert!(!body.contains("Leaking"));
    }

    #[tokio::test]
    async fn test_eager_mode_cuts_stream_with_blocked_notice() {
        let sse = "data: {\"response\":\"safe part\"}\n\ndata: {\"response\":\" now blocked\"}\n\ndata: {\"response\":\" hidden\"}\n\ndata: [DONE]\n\n";

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test-model"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let mut config = test_config(&mock_server.uri());
        config.relay.mode = RelayMode::Eager;
        let app = build_app(config);

        let response = post_chat(app, chat_body("hello")).await;

        // The stream started before the verdict, so the status is 200
        assert_eq!(response.status(), 200);
        let body = body_string(response).await;
        assert!(body.contains("safe part"));
        assert!(!body.contains("now blocked"));
        assert!(!body.contains("hidden"));
        assert!(body.contains("DLP_BLOCKED"));
        assert!(body.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn test_canned_gateway_failure_phrase_blocks() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test-model"))
            .respond_with(ResponseTemplate::new(502).set_body_raw(
                "Sorry, there was a problem processing your request",
                "text/plain",
            ))
            .mount(&mock_server)
            .await;

        let app = build_app(test_config(&mock_server.uri()));
        let response = post_chat(app, chat_body("hello")).await;

        assert_eq!(response.status(), 403);
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_messages_rejected_without_upstream_call() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let app = build_app(test_config(&mock_server.uri()));
        let response = post_chat(app, r#"{"messages":[]}"#.to_string()).await;

        assert_eq!(response.status(), 400);
        let body = body_string(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["error"]["message"].as_str().unwrap().contains("empty"));

        mock_server.verify().await;
    }

    #[tokio::test]
    async fn test_malformed_body_rejected_without_upstream_call() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let app = build_app(test_config(&mock_server.uri()));
        let response = post_chat(app, "{broken".to_string()).await;

        assert_eq!(response.status(), 400);
        mock_server.verify().await;
    }

    #[tokio::test]
    async fn test_upstream_failure_without_triggers_is_generic_500() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test-model"))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_raw(r#"{"error":"model overloaded"}"#, "application/json"),
            )
            .mount(&mock_server)
            .await;

        let app = build_app(test_config(&mock_server.uri()));
        let response = post_chat(app, chat_body("hello")).await;

        assert_eq!(response.status(), 500);
        let body = body_string(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"]["type"], "relay_error");
        // Upstream detail is logged, never exposed
        assert!(!body.contains("overloaded"));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_generic_500() {
        // Grab a port and release it so the connect is refused
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let app = build_app(test_config(&format!("http://{addr}")));
        let response = post_chat(app, chat_body("hello")).await;

        assert_eq!(response.status(), 500);
        let body = body_string(response).await;
        assert!(body.contains("relay_error"));
    }
}

mod completion_tests {
    use super::*;

    #[tokio::test]
    async fn test_non_streamed_completion_passes_through() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test-model"))
            .and(body_partial_json(serde_json::json!({"stream": false})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"{"response":"A fine answer"}"#, "application/json"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let app = build_app(test_config(&mock_server.uri()));
        let body = serde_json::json!({
            "messages": [{"role": "user", "content": "hello"}],
            "options": {"stream": false}
        })
        .to_string();
        let response = post_chat(app, body).await;

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        assert_eq!(
            body_string(response).await,
            r#"{"response":"A fine answer"}"#
        );
    }

    #[tokio::test]
    async fn test_non_streamed_completion_with_trigger_blocked() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test-model"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"response":"this mentions sensitive records"}"#,
                "application/json",
            ))
            .mount(&mock_server)
            .await;

        let app = build_app(test_config(&mock_server.uri()));
        let body = serde_json::json!({
            "messages": [{"role": "user", "content": "hello"}],
            "options": {"stream": false}
        })
        .to_string();
        let response = post_chat(app, body).await;

        assert_eq!(response.status(), 403);
        let json: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["error_code"], "DLP_BLOCKED");
    }
}
