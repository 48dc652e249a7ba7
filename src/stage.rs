//! Staging buffer between a stream source and the hardware ring.
//!
//! Decoders hand out data in whatever granularity their packets have; the
//! refill protocol needs exactly one half-buffer at a time. Sources push
//! into the stage and the refill pulls fixed-size chunks back out.

/// Threshold for compacting the stage - once this many consumed bytes sit
/// in front of the read position, the live data is shifted down.
const COMPACT_THRESHOLD: usize = 64 * 1024;

#[derive(Default)]
pub struct StreamStage {
    position: usize,
    buffer: Vec<u8>,
    eof: bool,
    /// Total bytes pulled since the last clear()
    total_bytes_consumed: u64,
}

impl StreamStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn clear(&mut self) {
        self.position = 0;
        self.buffer.clear();
        self.eof = false;
        self.total_bytes_consumed = 0;
    }

    /// Compact the stage by removing already-consumed bytes
    fn compact(&mut self) {
        if self.position > 0 {
            self.buffer.drain(..self.position);
            self.position = 0;
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        if self.position >= COMPACT_THRESHOLD {
            self.compact();
        }
        self.buffer.extend_from_slice(bytes);
    }

    /// Copies up to `dst.len()` buffered bytes into `dst` and returns how
    /// many were copied. Never pads.
    pub fn pull_into(&mut self, dst: &mut [u8]) -> usize {
        let available = self.buffer.len() - self.position;
        let n = dst.len().min(available);
        dst[..n].copy_from_slice(&self.buffer[self.position..self.position + n]);
        self.position += n;
        self.total_bytes_consumed += n as u64;

        if self.position == self.buffer.len() {
            self.position = 0;
            self.buffer.clear();
        } else if self.position >= COMPACT_THRESHOLD {
            self.compact();
        }
        n
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.position
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn set_eof(&mut self, eof: bool) {
        self.eof = eof;
    }

    /// Bytes handed to the hardware ring since the last clear()
    pub fn total_bytes_consumed(&self) -> u64 {
        self.total_bytes_consumed
    }
}
