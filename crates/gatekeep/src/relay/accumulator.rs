//! Per-invocation response capture
//!
//! Owned exclusively by one relay invocation; grows monotonically as deltas
//! arrive and is read by the policy inspector without being consumed. The
//! buffer is capped — overflow is dropped and flagged rather than aborting
//! the relay, so a very long response still streams while inspection sees
//! the leading `limit` bytes.

/// Append-only text buffer with a byte cap
#[derive(Debug)]
pub struct Capture {
    buf: String,
    limit: usize,
    truncated: bool,
}

impl Capture {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: String::new(),
            limit,
            truncated: false,
        }
    }

    /// Append a delta in call order. Past the cap, input is dropped and the
    /// truncation flag set; the stored prefix always ends on a character
    /// boundary.
    pub fn push(&mut self, delta: &str) {
        if self.truncated {
            return;
        }

        let remaining = self.limit.saturating_sub(self.buf.len());
        if delta.len() <= remaining {
            self.buf.push_str(delta);
            return;
        }

        let mut cut = remaining;
        while cut > 0 && !delta.is_char_boundary(cut) {
            cut -= 1;
        }
        self.buf.push_str(&delta[..cut]);
        self.truncated = true;
        tracing::warn!(
            limit = self.limit,
            "Capture buffer full, truncating inspection text"
        );
    }

    /// Current full text seen so far; does not mutate the buffer
    pub fn text(&self) -> &str {
        &self.buf
    }

    pub fn into_text(self) -> String {
        self.buf
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_in_call_order() {
        let mut capture = Capture::new(1024);
        capture.push("Hi");
        capture.push(" there");

        assert_eq!(capture.text(), "Hi there");
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let mut capture = Capture::new(1024);
        capture.push("same");

        let first = capture.text().to_string();
        let second = capture.text().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_delta_is_noop() {
        let mut capture = Capture::new(1024);
        capture.push("");
        assert!(capture.is_empty());
        assert!(!capture.truncated());
    }

    #[test]
    fn test_cap_truncates_and_flags() {
        let mut capture = Capture::new(8);
        capture.push("12345");
        capture.push("6789");

        assert_eq!(capture.text(), "12345678");
        assert!(capture.truncated());

        // Everything after the cap is dropped
        capture.push("more");
        assert_eq!(capture.len(), 8);
    }

    #[test]
    fn test_cap_respects_char_boundaries() {
        let mut capture = Capture::new(4);
        // "日" is 3 bytes; the second one would cross the cap
        capture.push("日日");

        assert_eq!(capture.text(), "日");
        assert!(capture.truncated());
    }
}
