//! Incremental text extraction from frame payloads
//!
//! Gateway responses vary in shape: Workers-AI-style chunks carry a top
//! level `response` field, OpenAI-compatible chunks nest the text under
//! `choices[0].delta.content` (streaming) or `choices[0].message.content`
//! (complete). The extractor tries those in fixed priority order. Anything
//! unparseable yields no delta and is skipped — heartbeat and control
//! frames are expected, not errors.

use serde_json::Value;

/// Extract the incremental text contributed by one frame payload.
pub fn extract(payload: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    extract_from_value(&value)
}

/// Same fallback chain over an already-parsed body (non-streaming path).
pub fn extract_from_value(value: &Value) -> Option<String> {
    if let Some(text) = value.get("response").and_then(Value::as_str) {
        return Some(text.to_string());
    }

    let choice = value.get("choices")?.get(0)?;

    if let Some(text) = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
    {
        return Some(text.to_string());
    }

    choice
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}
