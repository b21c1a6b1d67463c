use serde::Deserialize;

/// Main configuration structure for gatekeep
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream gateway configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Relay behavior configuration
    #[serde(default)]
    pub relay: RelayConfig,
    /// Content policy configuration
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8787")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".to_string()
}

/// Upstream model gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the generation gateway
    #[serde(default = "default_gateway_url")]
    pub url: String,
    /// Model identifier appended to the gateway URL
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Gateway instance id, forwarded so the gateway can apply its own
    /// caching and policy configuration
    #[serde(default)]
    pub gateway_id: Option<String>,
    /// Bearer token for the gateway (optional for local gateways)
    #[serde(default)]
    pub api_token: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum tokens requested per generation
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            model_id: default_model_id(),
            gateway_id: None,
            api_token: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:9000".to_string()
}

fn default_model_id() -> String {
    "@cf/meta/llama-3.1-8b-instruct".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_tokens() -> u32 {
    1024
}

/// Forwarding policy for streamed responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Accumulate the whole response, classify once, then emit. No partial
    /// content can reach the client before the verdict.
    Buffered,
    /// Forward each frame as it is produced. Lowest first-token latency,
    /// but bytes flushed before a mid-stream Blocked verdict cannot be
    /// unsent; the stream is cut short with a blocked notice instead.
    Eager,
}

impl Default for RelayMode {
    fn default() -> Self {
        RelayMode::Buffered
    }
}

/// Relay behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Streamed-response forwarding policy
    #[serde(default)]
    pub mode: RelayMode,
    /// Whether clients get a streamed response when they don't ask
    #[serde(default = "default_stream")]
    pub stream: bool,
    /// Inspect non-success upstream bodies before surfacing them
    #[serde(default = "default_pre_check")]
    pub pre_check: bool,
    /// Cap on the inspection buffer; overflow is dropped and flagged
    #[serde(default = "default_max_capture_bytes")]
    pub max_capture_bytes: usize,
    /// System prompt injected when the client supplies none
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// User-facing message returned when content is blocked
    #[serde(default = "default_blocked_message")]
    pub blocked_message: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: RelayMode::default(),
            stream: default_stream(),
            pre_check: default_pre_check(),
            max_capture_bytes: default_max_capture_bytes(),
            system_prompt: default_system_prompt(),
            blocked_message: default_blocked_message(),
        }
    }
}

fn default_stream() -> bool {
    true
}

fn default_pre_check() -> bool {
    true
}

fn default_max_capture_bytes() -> usize {
    1024 * 1024
}

fn default_system_prompt() -> String {
    "You are a helpful, friendly assistant. Provide concise and accurate responses.".to_string()
}

fn default_blocked_message() -> String {
    "Your request was blocked by the data loss prevention policy.".to_string()
}

/// Content policy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Trigger terms; any case-insensitive occurrence flips the verdict
    #[serde(default = "default_triggers")]
    pub triggers: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            triggers: default_triggers(),
        }
    }
}

fn default_triggers() -> Vec<String> {
    [
        "policy",
        "blocked",
        "sensitive",
        "guardrail",
        // Canned failure phrase the gateway emits in place of a structured
        // error body.
        "sorry, there was a problem processing your request",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
