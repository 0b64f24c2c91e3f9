//! Session-long zlib inflater.
//!
//! ZRLE recordings carry one continuous zlib stream: the encoder never
//! restarts it between rectangles or frames, so every rectangle payload
//! is a continuation of the previous one. [`StreamingDecompressor`]
//! keeps that context alive for the whole session and hands back only
//! the bytes produced by each [`feed`](StreamingDecompressor::feed).

use flate2::{Decompress, FlushDecompress, Status};

use crate::config::DEFAULT_INFLATE_CHUNK;
use crate::error::FbsError;

pub struct StreamingDecompressor {
    inner: Decompress,
    /// Bounded output window reused by every inflate call.
    chunk: Vec<u8>,
    /// Cumulative output already handed to callers.
    inflated: u64,
}

impl StreamingDecompressor {
    /// Create an inflater expecting a zlib header, with the given
    /// output chunk size.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            inner: Decompress::new(true),
            chunk: vec![0u8; chunk_size.max(1)],
            inflated: 0,
        }
    }

    /// Inflate `input` and return the newly produced bytes.
    ///
    /// Stops once the input is consumed and the last chunk was not
    /// filled, at stream end, or when an iteration makes no progress.
    pub fn feed(&mut self, input: &[u8]) -> Result<Vec<u8>, FbsError> {
        let mut out = Vec::new();
        let mut consumed = 0usize;

        loop {
            let before_in = self.inner.total_in();
            let status = self
                .inner
                .decompress(&input[consumed..], &mut self.chunk, FlushDecompress::None)
                .map_err(|e| {
                    FbsError::Decompression(format!(
                        "{e} (after {} compressed bytes)",
                        self.inner.total_in()
                    ))
                })?;

            let used = (self.inner.total_in() - before_in) as usize;
            consumed += used;

            let produced = (self.inner.total_out() - self.inflated) as usize;
            out.extend_from_slice(&self.chunk[..produced]);
            self.inflated = self.inner.total_out();

            if status == Status::StreamEnd {
                if consumed < input.len() {
                    tracing::warn!(
                        "zlib stream ended with {} input bytes unused",
                        input.len() - consumed
                    );
                }
                break;
            }
            if used == 0 && produced == 0 {
                break;
            }
            if consumed >= input.len() && produced < self.chunk.len() {
                break;
            }
        }

        Ok(out)
    }

    /// Reinitialise the zlib context. Only a rewind to the start of the
    /// data region may call this.
    pub fn reset(&mut self) {
        self.inner.reset(true);
        self.inflated = self.inner.total_out();
    }

    /// Compressed bytes consumed since the last reset.
    pub fn total_in(&self) -> u64 {
        self.inner.total_in()
    }

    /// Decompressed bytes produced since the last reset.
    pub fn total_out(&self) -> u64 {
        self.inner.total_out()
    }
}

impl Default for StreamingDecompressor {
    fn default() -> Self {
        Self::new(DEFAULT_INFLATE_CHUNK)
    }
}

impl std::fmt::Debug for StreamingDecompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingDecompressor")
            .field("chunk", &self.chunk.len())
            .field("total_in", &self.inner.total_in())
            .field("total_out", &self.inner.total_out())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
