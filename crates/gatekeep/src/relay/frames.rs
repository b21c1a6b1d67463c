//! SSE frame reassembly from arbitrarily split byte chunks
//!
//! Upstream bodies arrive as network reads that can end mid-frame, mid-line,
//! or mid-character. The reassembler buffers raw bytes and only ever splits
//! at line boundaries, so a multi-byte character whose bytes straddle two
//! chunks is decoded intact once its line completes.

use bytes::Bytes;

/// One complete protocol unit extracted from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Payload of a `data:` line
    Data(String),
    /// The `[DONE]` termination marker
    Done,
}

/// End-of-stream sentinel payload
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data:";

/// Stateful reassembler turning raw chunks into complete frames.
///
/// One instance per relay invocation; never shared across requests.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    pending: Vec<u8>,
    finished: bool,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk, yielding every frame completed by it, in arrival
    /// order. Once `[DONE]` has been seen the sequence is closed and any
    /// further bytes are ignored.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if self.finished || chunk.is_empty() {
            return Vec::new();
        }

        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            if let Some(frame) = parse_line(line) {
                let done = frame == Frame::Done;
                frames.push(frame);
                if done {
                    // Stop at the first termination marker even if more
                    // bytes are buffered.
                    self.finished = true;
                    self.pending.clear();
                    break;
                }
            }
        }

        frames
    }

    /// Signal end of input. Leftover unterminated bytes are discarded, not
    /// emitted as a partial frame; the number discarded is returned for
    /// logging.
    pub fn finish(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        self.finished = true;
        discarded
    }

    /// Whether the termination marker has been observed
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Encode a payload as a client-bound `data:` frame
pub fn encode_data_frame(payload: &str) -> Bytes {
    Bytes::from(format!("{DATA_PREFIX} {payload}\n\n"))
}

/// Encode the termination frame
pub fn encode_done_frame() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// Parse one complete line into a frame.
///
/// Lines without the `data:` prefix (comments, blank keep-alives, other SSE
/// fields) are discarded, as are lines that are not valid UTF-8 after
/// reassembly.
fn parse_line(bytes: &[u8]) -> Option<Frame> {
    if bytes.is_empty() {
        return None;
    }

    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(error = %e, "Discarding non-UTF-8 line");
            return None;
        }
    };

    let payload = text.strip_prefix(DATA_PREFIX)?.trim();

    if payload == DONE_SENTINEL {
        Some(Frame::Done)
    } else {
        Some(Frame::Data(payload.to_string()))
    }
}
