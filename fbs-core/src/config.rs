//! Decoder tunables.
//!
//! Embedded in front-end configuration files, so every field has a
//! default and the struct round-trips through serde.

use serde::{Deserialize, Serialize};

/// Largest compressed rectangle payload accepted (64 MiB).
pub const DEFAULT_MAX_RECT_PAYLOAD: u32 = 64 * 1024 * 1024;

/// Largest record payload accepted (128 MiB).
pub const DEFAULT_MAX_RECORD_LEN: u32 = 128 * 1024 * 1024;

/// Output chunk used by the streaming inflater.
pub const DEFAULT_INFLATE_CHUNK: usize = 128_000;

/// What to do when a run length exceeds the pixels left in a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrunPolicy {
    /// Fail the rectangle with [`FbsError::RunLengthOverrun`](crate::FbsError::RunLengthOverrun).
    #[default]
    Abort,
    /// Truncate the run at the tile end, log it and count it in the
    /// frame report.
    Clip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Ceiling for a rectangle's declared compressed length.
    pub max_rect_payload: u32,
    /// Ceiling for a record's declared length.
    pub max_record_len: u32,
    /// Inflate output chunk size in bytes.
    pub inflate_chunk: usize,
    /// Run-length overrun handling.
    pub overrun_policy: OverrunPolicy,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_rect_payload: DEFAULT_MAX_RECT_PAYLOAD,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
            inflate_chunk: DEFAULT_INFLATE_CHUNK,
            overrun_policy: OverrunPolicy::Abort,
        }
    }
}

impl DecoderConfig {
    pub fn with_overrun_policy(mut self, policy: OverrunPolicy) -> Self {
        self.overrun_policy = policy;
        self
    }

    pub fn with_max_rect_payload(mut self, max: u32) -> Self {
        self.max_rect_payload = max;
        self
    }

    /// Set the inflate chunk; zero is bumped to one byte.
    pub fn with_inflate_chunk(mut self, chunk: usize) -> Self {
        self.inflate_chunk = chunk.max(1);
        self
    }
}
