//! Domain-specific error types for FBS decoding.
//!
//! All fallible operations return `Result<T, FbsError>`.
//! No panics on malformed recordings: every error is typed, and the
//! per-frame ones carry enough context (record offset, rectangle index)
//! to diagnose.

use thiserror::Error;

/// The canonical error type for opening and decoding a recording.
#[derive(Debug, Error)]
pub enum FbsError {
    // ── Format Errors ────────────────────────────────────────────
    /// The resource does not start with the `FBS 001.000` signature.
    #[error("invalid magic bytes: expected \"FBS 001.000\"")]
    InvalidMagic,

    /// A header or record field could not be parsed.
    #[error("format error: {0}")]
    Format(String),

    /// The input ended before a structure was complete.
    #[error("truncated {what}: needed {needed} bytes, {available} available")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    /// The recording's pixel layout is recognised but not decodable.
    #[error(
        "unsupported pixel format: {bits_per_pixel} bpp, depth {depth} (true colour: {true_color})"
    )]
    UnsupportedPixelFormat {
        bits_per_pixel: u8,
        depth: u8,
        true_color: bool,
    },

    // ── Decode Errors ────────────────────────────────────────────
    /// The zlib stream reported corruption.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// A declared length exceeds the configured ceiling.
    #[error("declared {what} length {declared} exceeds limit {max}")]
    OverflowGuard {
        what: &'static str,
        declared: u64,
        max: u64,
    },

    /// The decompressed rectangle data ran out in the middle of a tile.
    #[error("tile data exhausted: needed {needed} bytes, {available} left")]
    Exhausted { needed: usize, available: usize },

    /// A run length would write past the end of its tile.
    #[error("run of {run} pixels overruns tile ({remaining} pixels left)")]
    RunLengthOverrun { run: usize, remaining: usize },

    /// A packed index points outside the tile palette.
    #[error("palette index {index} out of range (palette size {palette_size})")]
    InvalidPaletteIndex { index: usize, palette_size: usize },

    /// A rectangle does not fit inside the framebuffer.
    #[error("rectangle {width}x{height}+{x}+{y} outside {fb_width}x{fb_height} framebuffer")]
    RectangleOutOfBounds {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        fb_width: u16,
        fb_height: u16,
    },

    /// Context wrapper for a failure inside one rectangle of a record.
    #[error("record at offset {offset}, rectangle {index}: {source}")]
    Rectangle {
        offset: u64,
        index: usize,
        #[source]
        source: Box<FbsError>,
    },

    // ── Session Errors ───────────────────────────────────────────
    /// An earlier error left the zlib stream out of step with the
    /// recording. Only a seek can recover.
    #[error("decoder desynchronized; seek to recover")]
    Desynchronized,

    /// The underlying byte source reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl FbsError {
    /// Wrap `self` with the record offset and rectangle index it came from.
    pub fn in_rectangle(self, offset: u64, index: usize) -> Self {
        FbsError::Rectangle {
            offset,
            index,
            source: Box::new(self),
        }
    }

    /// Whether this belongs to the open-time FormatError family.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            FbsError::InvalidMagic | FbsError::Format(_) | FbsError::Truncated { .. }
        )
    }

    /// Whether the decompressor can no longer be trusted after this error.
    ///
    /// Tile-level failures happen after the rectangle payload has been
    /// fed to the inflater, so the stream stays in step. Corrupt zlib
    /// data, refused payloads and broken record framing do not.
    pub fn desynchronizes(&self) -> bool {
        match self {
            FbsError::Rectangle { source, .. } => source.desynchronizes(),
            FbsError::Decompression(_)
            | FbsError::OverflowGuard { .. }
            | FbsError::Truncated { .. }
            | FbsError::Format(_)
            | FbsError::Desynchronized
            | FbsError::Io(_) => true,
            _ => false,
        }
    }
}

// ── SeekError ─────────────────────────────────────────────────────

/// Failure of a replay-based seek.
#[derive(Debug, Error)]
pub enum SeekError {
    /// Rewinding the byte source failed.
    #[error("seek i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be replayed without desynchronizing.
    #[error("replay failed at offset {offset}: {source}")]
    Replay {
        offset: u64,
        #[source]
        source: FbsError,
    },

    /// The recording ended before any record reached the target.
    ///
    /// The framebuffer holds the state after the final record.
    #[error("target {target_ms} ms is past the end (last record at {last_ms} ms)")]
    PastEnd { target_ms: u32, last_ms: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = FbsError::InvalidMagic;
        assert!(e.to_string().contains("magic"));

        let e = FbsError::OverflowGuard {
            what: "rectangle payload",
            declared: 70_000_000,
            max: 67_108_864,
        };
        assert!(e.to_string().contains("70000000"));
        assert!(e.to_string().contains("67108864"));
    }

    #[test]
    fn rectangle_context_keeps_source() {
        let e = FbsError::RunLengthOverrun {
            run: 521,
            remaining: 12,
        }
        .in_rectangle(96, 2);
        let text = e.to_string();
        assert!(text.contains("offset 96"));
        assert!(text.contains("rectangle 2"));
        assert!(text.contains("521"));
        assert!(!e.desynchronizes());
    }

    #[test]
    fn desync_classification() {
        assert!(FbsError::Decompression("bad".into()).desynchronizes());
        assert!(
            FbsError::OverflowGuard {
                what: "x",
                declared: 2,
                max: 1
            }
            .in_rectangle(0, 0)
            .desynchronizes()
        );
        assert!(
            !FbsError::InvalidPaletteIndex {
                index: 9,
                palette_size: 3
            }
            .desynchronizes()
        );
    }

    #[test]
    fn format_family() {
        assert!(FbsError::InvalidMagic.is_format_error());
        assert!(
            !FbsError::UnsupportedPixelFormat {
                bits_per_pixel: 16,
                depth: 16,
                true_color: true
            }
            .is_format_error()
        );
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let e: FbsError = io_err.into();
        assert!(matches!(e, FbsError::Io(_)));
        let s: SeekError = std::io::Error::other("x").into();
        assert!(matches!(s, SeekError::Io(_)));
    }
}
