//! Incremental NDJSON line reassembly.
//!
//! Upstream chunks may contain zero, one, or many newline-delimited JSON
//! objects, and a single object may split across chunk boundaries. The
//! decoder buffers partial lines and hands out only complete ones; parsing
//! happens on whole lines, never on fragments.

use bytes::BytesMut;

/// Buffering line splitter over an incoming byte-chunk sequence.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: BytesMut,
}

impl LineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Append one upstream chunk.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete, non-empty line, if one has accumulated.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let end = self.buf.iter().position(|&b| b == b'\n')? + 1;
            let line = self.buf.split_to(end);
            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(trimmed.to_string());
        }
    }

    /// Trailing partial line once the upstream has closed, if non-empty.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        let text = String::from_utf8_lossy(&rest);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}
