//! FramebufferUpdate decoding.
//!
//! Walks the rectangles of one update message, feeds each compressed
//! payload to the session's [`StreamingDecompressor`] and hands the
//! inflated tile data to the [`TileDecoder`].

use tracing::{debug, trace, warn};

use crate::be;
use crate::config::DecoderConfig;
use crate::error::FbsError;
use crate::framebuffer::FrameBuffer;
use crate::inflate::StreamingDecompressor;
use crate::pixel::PixelFormat;
use crate::zrle::encoder::ENCODING_ZRLE;
use crate::zrle::tile::TileDecoder;

/// Server message type of a FramebufferUpdate.
pub const FRAMEBUFFER_UPDATE: u8 = 0;

/// Type, padding and rectangle count.
const UPDATE_HEADER_LEN: usize = 4;

/// x, y, width, height, encoding, compressed length.
const RECT_HEADER_LEN: usize = 16;

// ── FrameReport ──────────────────────────────────────────────────

/// What one record did to the framebuffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Rectangles fully applied.
    pub rectangles: usize,
    /// Tiles written.
    pub tiles: usize,
    /// Runs truncated under the clip overrun policy.
    pub clipped_runs: usize,
    /// Message type of a non-update record that was passed over.
    pub skipped_message: Option<u8>,
}

impl FrameReport {
    pub fn is_skipped(&self) -> bool {
        self.skipped_message.is_some()
    }
}

// ── RectHeader ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct RectHeader {
    x: u16,
    y: u16,
    width: u16,
    height: u16,
    encoding: i32,
    length: u32,
}

impl RectHeader {
    fn parse(payload: &[u8], at: usize) -> Result<Self, FbsError> {
        const WHAT: &str = "rectangle header";
        Ok(Self {
            x: be::read_u16(payload, at, WHAT)?,
            y: be::read_u16(payload, at + 2, WHAT)?,
            width: be::read_u16(payload, at + 4, WHAT)?,
            height: be::read_u16(payload, at + 6, WHAT)?,
            encoding: be::read_u32(payload, at + 8, WHAT)? as i32,
            length: be::read_u32(payload, at + 12, WHAT)?,
        })
    }
}

// ── FrameDecoder ─────────────────────────────────────────────────

/// Decodes update records into a [`FrameBuffer`].
///
/// Holds the only zlib context of the session; it is never reset
/// between records.
pub struct FrameDecoder {
    inflater: StreamingDecompressor,
    tiles: TileDecoder,
    max_rect_payload: u32,
}

impl FrameDecoder {
    pub fn new(format: PixelFormat, config: &DecoderConfig) -> Self {
        Self {
            inflater: StreamingDecompressor::new(config.inflate_chunk),
            tiles: TileDecoder::new(format, config.overrun_policy),
            max_rect_payload: config.max_rect_payload,
        }
    }

    /// Decode the record payload found at byte `offset` into `fb`.
    ///
    /// After a rectangle fails, the payloads of the rectangles that
    /// follow are still inflated (and discarded) so the zlib stream
    /// stays aligned with the recording. Rectangles applied before the
    /// failure stay applied.
    pub fn decode_frame(
        &mut self,
        offset: u64,
        payload: &[u8],
        fb: &mut FrameBuffer,
    ) -> Result<FrameReport, FbsError> {
        let mut report = FrameReport::default();

        let Some(&message_type) = payload.first() else {
            return Err(FbsError::Truncated {
                what: "server message",
                needed: 1,
                available: 0,
            });
        };
        if message_type != FRAMEBUFFER_UPDATE {
            debug!("skipping server message type {message_type} at offset {offset}");
            report.skipped_message = Some(message_type);
            return Ok(report);
        }

        let count = be::read_u16(payload, 2, "update header")? as usize;
        let mut at = UPDATE_HEADER_LEN;
        let mut failure: Option<FbsError> = None;

        for index in 0..count {
            let header =
                RectHeader::parse(payload, at).map_err(|e| e.in_rectangle(offset, index))?;
            at += RECT_HEADER_LEN;

            if header.length > self.max_rect_payload {
                return Err(FbsError::OverflowGuard {
                    what: "rectangle payload",
                    declared: u64::from(header.length),
                    max: u64::from(self.max_rect_payload),
                }
                .in_rectangle(offset, index));
            }
            let end = at + header.length as usize;
            let Some(data) = payload.get(at..end) else {
                return Err(FbsError::Truncated {
                    what: "rectangle payload",
                    needed: end,
                    available: payload.len(),
                }
                .in_rectangle(offset, index));
            };
            at = end;

            if header.encoding != ENCODING_ZRLE {
                warn!(
                    "rectangle {index} at offset {offset} has encoding {}, decoding as ZRLE",
                    header.encoding
                );
            }

            let inflated = self
                .inflater
                .feed(data)
                .map_err(|e| e.in_rectangle(offset, index))?;

            if failure.is_some() {
                continue;
            }

            trace!(
                "rectangle {index}: {}x{}+{}+{} ({} -> {} bytes)",
                header.width,
                header.height,
                header.x,
                header.y,
                data.len(),
                inflated.len()
            );
            match self.tiles.decode_rectangle(
                &inflated,
                header.x,
                header.y,
                header.width,
                header.height,
                fb,
            ) {
                Ok(stats) => {
                    report.rectangles += 1;
                    report.tiles += stats.tiles;
                    report.clipped_runs += stats.clipped_runs;
                }
                Err(e) => failure = Some(e.in_rectangle(offset, index)),
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Start a fresh zlib stream. Only valid at the data-start offset.
    pub fn reset(&mut self) {
        self.inflater.reset();
    }
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("inflater", &self.inflater)
            .field("max_rect_payload", &self.max_rect_payload)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
