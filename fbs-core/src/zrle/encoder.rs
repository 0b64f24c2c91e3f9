//! ZRLE encoder.
//!
//! The inverse of the decoder, used to synthesise recordings:
//!
//! - [`TileEncoder`] writes one tile in any subencoding.
//! - [`RectangleEncoder`] splits a rectangle into tiles, compresses them
//!   with a [`SyncDeflater`] shared by every rectangle of the session,
//!   and prepends the rectangle header.
//! - [`update_message`] wraps rectangles into a FramebufferUpdate.

use flate2::{Compress, Compression, FlushCompress};

use crate::error::FbsError;
use crate::pixel::{PixelFormat, Rgb24};
use crate::zrle::tile::{MAX_PALETTE_SIZE, Subencoding, TILE_SIZE, index_bits};

/// RFB encoding number for ZRLE.
pub const ENCODING_ZRLE: i32 = 16;

// ── SyncDeflater ─────────────────────────────────────────────────

/// One zlib stream for the whole session, sync-flushed after every
/// rectangle so each payload inflates on its own.
pub struct SyncDeflater {
    inner: Compress,
}

impl SyncDeflater {
    pub fn new() -> Self {
        Self {
            inner: Compress::new(Compression::default(), true),
        }
    }

    /// Compress `data` and sync-flush.
    pub fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>, FbsError> {
        let mut out = Vec::with_capacity(data.len() / 2 + 64);
        let start = self.inner.total_in();

        loop {
            if out.len() == out.capacity() {
                out.reserve(out.capacity().max(64));
            }
            let consumed = (self.inner.total_in() - start) as usize;
            self.inner
                .compress_vec(&data[consumed..], &mut out, FlushCompress::Sync)
                .map_err(std::io::Error::other)?;

            let consumed = (self.inner.total_in() - start) as usize;
            if consumed == data.len() && out.len() < out.capacity() {
                break;
            }
        }
        Ok(out)
    }
}

impl Default for SyncDeflater {
    fn default() -> Self {
        Self::new()
    }
}

// ── TileEncoder ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct TileEncoder {
    format: PixelFormat,
}

impl TileEncoder {
    pub fn new(format: PixelFormat) -> Self {
        Self { format }
    }

    pub fn solid(&self, out: &mut Vec<u8>, color: Rgb24) {
        out.push(Subencoding::Solid.to_byte());
        self.color(out, color);
    }

    pub fn raw(&self, out: &mut Vec<u8>, pixels: &[Rgb24]) {
        out.push(Subencoding::Raw.to_byte());
        for &px in pixels {
            self.color(out, px);
        }
    }

    /// Palette followed by row-aligned, MSB-first packed indices.
    pub fn packed_palette(
        &self,
        out: &mut Vec<u8>,
        palette: &[Rgb24],
        pixels: &[Rgb24],
        width: usize,
    ) -> Result<(), FbsError> {
        check_palette(palette)?;
        out.push(
            Subencoding::PackedPalette {
                palette_size: palette.len(),
            }
            .to_byte(),
        );
        self.palette(out, palette);

        let bits = index_bits(palette.len());
        for row in pixels.chunks(width.max(1)) {
            let mut byte = 0u8;
            let mut used = 0u32;
            for &px in row {
                let index = lookup(palette, px)? as u8;
                used += bits;
                byte |= index << (8 - used);
                if used == 8 {
                    out.push(byte);
                    byte = 0;
                    used = 0;
                }
            }
            if used > 0 {
                out.push(byte);
            }
        }
        Ok(())
    }

    pub fn plain_rle(&self, out: &mut Vec<u8>, pixels: &[Rgb24]) {
        out.push(Subencoding::PlainRle.to_byte());
        for (color, run) in runs(pixels) {
            self.color(out, color);
            run_length(out, run);
        }
    }

    pub fn packed_rle(
        &self,
        out: &mut Vec<u8>,
        palette: &[Rgb24],
        pixels: &[Rgb24],
    ) -> Result<(), FbsError> {
        check_palette(palette)?;
        out.push(
            Subencoding::PackedRle {
                palette_size: palette.len(),
            }
            .to_byte(),
        );
        self.palette(out, palette);

        for (color, run) in runs(pixels) {
            let index = lookup(palette, color)? as u8;
            if run == 1 {
                out.push(index);
            } else {
                out.push(index | 0x80);
                run_length(out, run);
            }
        }
        Ok(())
    }

    /// Pick a reasonable subencoding for `pixels`.
    pub fn auto(&self, out: &mut Vec<u8>, pixels: &[Rgb24], width: usize) {
        let mut palette: Vec<Rgb24> = Vec::new();
        for &px in pixels {
            if !palette.contains(&px) {
                palette.push(px);
                if palette.len() > 16 {
                    break;
                }
            }
        }

        let result = match palette.len() {
            0 | 1 => {
                self.solid(out, pixels.first().copied().unwrap_or(0));
                Ok(())
            }
            2..=16 if runs(pixels).count() * 2 < pixels.len() => {
                self.packed_rle(out, &palette, pixels)
            }
            2..=16 => self.packed_palette(out, &palette, pixels, width),
            _ if runs(pixels).count() * 4 < pixels.len() => {
                self.plain_rle(out, pixels);
                Ok(())
            }
            _ => {
                self.raw(out, pixels);
                Ok(())
            }
        };
        // Palettes built above always contain every pixel.
        debug_assert!(result.is_ok());
    }

    fn color(&self, out: &mut Vec<u8>, color: Rgb24) {
        out.extend_from_slice(&self.format.encode_cpixel(color));
    }

    fn palette(&self, out: &mut Vec<u8>, palette: &[Rgb24]) {
        for &c in palette {
            self.color(out, c);
        }
    }
}

fn check_palette(palette: &[Rgb24]) -> Result<(), FbsError> {
    if palette.len() < 2 || palette.len() > MAX_PALETTE_SIZE {
        return Err(FbsError::Format(format!(
            "palette of {} colours cannot be packed",
            palette.len()
        )));
    }
    Ok(())
}

fn lookup(palette: &[Rgb24], color: Rgb24) -> Result<usize, FbsError> {
    palette
        .iter()
        .position(|&c| c == color)
        .ok_or_else(|| FbsError::Format(format!("colour {color:#08x} missing from palette")))
}

/// Collapse `pixels` into `(colour, run)` pairs.
fn runs(pixels: &[Rgb24]) -> impl Iterator<Item = (Rgb24, usize)> + '_ {
    pixels
        .chunk_by(|a, b| a == b)
        .map(|run| (run[0], run.len()))
}

/// Write `run - 1` as 255-continued bytes.
fn run_length(out: &mut Vec<u8>, run: usize) {
    let mut rest = run - 1;
    while rest >= 255 {
        out.push(255);
        rest -= 255;
    }
    out.push(rest as u8);
}

// ── RectangleEncoder ─────────────────────────────────────────────

pub struct RectangleEncoder {
    tiles: TileEncoder,
    deflater: SyncDeflater,
}

impl RectangleEncoder {
    pub fn new(format: PixelFormat) -> Self {
        Self {
            tiles: TileEncoder::new(format),
            deflater: SyncDeflater::new(),
        }
    }

    /// Encode a `width × height` block of row-major `pixels` placed at
    /// `(x, y)`, choosing a subencoding per tile.
    pub fn encode(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        pixels: &[Rgb24],
    ) -> Result<Vec<u8>, FbsError> {
        let (w, h) = (width as usize, height as usize);
        if pixels.len() != w * h {
            return Err(FbsError::Format(format!(
                "{} pixels for a {width}x{height} rectangle",
                pixels.len()
            )));
        }

        let mut tiles = Vec::new();
        let mut scratch = Vec::with_capacity(TILE_SIZE as usize * TILE_SIZE as usize);
        for ty in (0..h).step_by(TILE_SIZE as usize) {
            let tile_h = (TILE_SIZE as usize).min(h - ty);
            for tx in (0..w).step_by(TILE_SIZE as usize) {
                let tile_w = (TILE_SIZE as usize).min(w - tx);
                scratch.clear();
                for row in ty..ty + tile_h {
                    scratch.extend_from_slice(&pixels[row * w + tx..row * w + tx + tile_w]);
                }
                self.tiles.auto(&mut tiles, &scratch, tile_w);
            }
        }
        self.encode_tiles(x, y, width, height, &tiles)
    }

    /// Frame already-encoded tile data (uncompressed) as a rectangle.
    pub fn encode_tiles(
        &mut self,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        tile_data: &[u8],
    ) -> Result<Vec<u8>, FbsError> {
        let compressed = self.deflater.compress(tile_data)?;
        let mut out = Vec::with_capacity(16 + compressed.len());
        out.extend_from_slice(&x.to_be_bytes());
        out.extend_from_slice(&y.to_be_bytes());
        out.extend_from_slice(&width.to_be_bytes());
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(&ENCODING_ZRLE.to_be_bytes());
        out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    pub fn tile_encoder(&self) -> &TileEncoder {
        &self.tiles
    }
}

/// A FramebufferUpdate message carrying `rects`.
pub fn update_message(rects: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0u8, 0];
    out.extend_from_slice(&(rects.len() as u16).to_be_bytes());
    for rect in rects {
        out.extend_from_slice(rect);
    }
    out
}
