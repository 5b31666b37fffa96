//! Per-direction pending byte buffer.

use bytes::{Buf, BytesMut};

use crate::inspection::Verdict;

/// Initial allocation for a direction buffer; grows on demand up to the limit.
const INITIAL_CAPACITY: usize = 8 * 1024;

/// The buffer would grow past its configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("buffer limit of {limit} bytes exceeded")]
pub struct CapacityExceeded {
    pub limit: usize,
}

/// Bytes received from one peer and not yet handed to the other, together
/// with the latest verdict for them.
#[derive(Debug)]
pub struct DirectionBuffer {
    buf: BytesMut,
    limit: usize,
    verdict: Verdict,
}

impl DirectionBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_CAPACITY.min(limit)),
            limit,
            verdict: Verdict::Allow,
        }
    }

    /// Appends received bytes. Nothing is appended if `data` does not fit.
    pub fn append(&mut self, data: &[u8]) -> Result<(), CapacityExceeded> {
        if data.len() > self.remaining() {
            return Err(CapacityExceeded { limit: self.limit });
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Drops the first `n` bytes after they were handed to the transport.
    pub fn consume(&mut self, n: usize) {
        self.buf.advance(n.min(self.buf.len()));
    }

    /// Bytes waiting to be forwarded, oldest first.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Room left before the limit is reached.
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.buf.len())
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn set_verdict(&mut self, verdict: Verdict) {
        self.verdict = verdict;
    }

    /// True when the pending bytes are approved and there is something to send.
    pub fn ready_to_flush(&self) -> bool {
        self.verdict == Verdict::Allow && !self.buf.is_empty()
    }
}
