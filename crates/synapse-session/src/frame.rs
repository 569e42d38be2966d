//! Line framing for the pull transport.
//!
//! The response body arrives in reads of arbitrary size. `FrameDecoder`
//! buffers raw bytes and only releases a frame once its `\n` terminator has
//! been seen, so a prefix, a `\r\n` pair, or a multi-byte UTF-8 sequence
//! split across two reads is reassembled before anything looks at it.

use crate::error::ProtocolError;

/// One line-delimited unit of the pull stream, terminator stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode the frame as UTF-8.
    pub fn as_text(&self) -> Result<&str, ProtocolError> {
        std::str::from_utf8(&self.bytes).map_err(|e| ProtocolError::InvalidUtf8 {
            valid_up_to: e.valid_up_to(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// Incremental byte-level line splitter.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    /// Bytes of `pending` already searched for a terminator.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completes, in order.
    ///
    /// The unterminated tail stays buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut cursor = self.scanned;

        while let Some(offset) = self.pending[cursor..].iter().position(|&b| b == b'\n') {
            let end = cursor + offset;
            frames.push(Self::frame_from(&self.pending[start..end]));
            start = end + 1;
            cursor = start;
        }

        if start > 0 {
            self.pending.drain(..start);
        }
        self.scanned = self.pending.len();
        frames
    }

    /// Flush the unterminated remainder at end of stream.
    ///
    /// Returns `None` when nothing is buffered.
    pub fn finish(&mut self) -> Option<Frame> {
        self.scanned = 0;
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(Self::frame_from(&rest))
    }

    /// Number of buffered bytes not yet released as a frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn frame_from(line: &[u8]) -> Frame {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        Frame::new(line)
    }
}
