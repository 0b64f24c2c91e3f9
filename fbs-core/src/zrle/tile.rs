//! ZRLE tile decoding.
//!
//! A rectangle's decompressed data is a row-major sequence of tiles of
//! at most 64×64 pixels (clipped at the right and bottom edges). Each
//! tile starts with a subencoding byte:
//!
//! ```text
//! bit 7     run-length flag
//! bits 0-6  palette size: 0 none, 1 solid, 2..=127 indexed
//! ```
//!
//! | palette | RLE | variant                                   |
//! |---------|-----|-------------------------------------------|
//! | 1       | any | solid fill                                 |
//! | 0       | no  | raw colours                                |
//! | 2..=127 | no  | palette + packed indices (1/2/4/8 bits)    |
//! | 0       | yes | colour + run length, repeated              |
//! | 2..=127 | yes | palette + index/run pairs                  |
//!
//! Run lengths are `1 + Σ bytes`, where a byte of 255 means another
//! byte follows.

use bitflags::bitflags;
use tracing::warn;

use crate::be::ByteCursor;
use crate::config::OverrunPolicy;
use crate::error::FbsError;
use crate::framebuffer::FrameBuffer;
use crate::pixel::{CPIXEL_LEN, PixelFormat, Rgb24};

/// Edge length of a full tile.
pub const TILE_SIZE: u16 = 64;

/// Largest palette a subencoding byte can announce.
pub const MAX_PALETTE_SIZE: usize = 127;

const TILE_PIXELS: usize = TILE_SIZE as usize * TILE_SIZE as usize;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct SubencodingFlags: u8 {
        const RUN_LENGTH = 0x80;
    }
}

// ── Subencoding ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subencoding {
    Solid,
    Raw,
    PackedPalette { palette_size: usize },
    PlainRle,
    PackedRle { palette_size: usize },
}

impl Subencoding {
    pub fn from_byte(byte: u8) -> Self {
        let run_length =
            SubencodingFlags::from_bits_retain(byte).contains(SubencodingFlags::RUN_LENGTH);
        let palette_size = (byte & 0x7F) as usize;
        match (palette_size, run_length) {
            (1, _) => Subencoding::Solid,
            (0, false) => Subencoding::Raw,
            (0, true) => Subencoding::PlainRle,
            (n, false) => Subencoding::PackedPalette { palette_size: n },
            (n, true) => Subencoding::PackedRle { palette_size: n },
        }
    }

    pub fn to_byte(self) -> u8 {
        let rle = SubencodingFlags::RUN_LENGTH.bits();
        match self {
            Subencoding::Solid => 1,
            Subencoding::Raw => 0,
            Subencoding::PlainRle => rle,
            Subencoding::PackedPalette { palette_size } => palette_size.min(MAX_PALETTE_SIZE) as u8,
            Subencoding::PackedRle { palette_size } => rle | palette_size.min(MAX_PALETTE_SIZE) as u8,
        }
    }
}

/// Bits per packed palette index.
pub const fn index_bits(palette_size: usize) -> u32 {
    if palette_size > 16 {
        8
    } else if palette_size > 4 {
        4
    } else if palette_size > 2 {
        2
    } else {
        1
    }
}

// ── Tile ─────────────────────────────────────────────────────────

/// Scratch pixels for one tile, reused across the whole session.
#[derive(Debug, Clone)]
pub struct Tile {
    width: u16,
    height: u16,
    pixels: Vec<Rgb24>,
}

impl Tile {
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            pixels: vec![0; TILE_PIXELS],
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Decoded pixels, row-major, `width * height` of them.
    pub fn pixels(&self) -> &[Rgb24] {
        &self.pixels[..self.len()]
    }

    pub fn row(&self, y: usize) -> &[Rgb24] {
        let w = self.width as usize;
        &self.pixels[y * w..(y + 1) * w]
    }

    /// Resize to `width × height` (clamped to 64×64) and paint it.
    pub fn fill(&mut self, width: u16, height: u16, color: Rgb24) {
        self.resize(width, height);
        self.pixels_mut().fill(color);
    }

    fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn resize(&mut self, width: u16, height: u16) {
        self.width = width.min(TILE_SIZE);
        self.height = height.min(TILE_SIZE);
    }

    fn pixels_mut(&mut self) -> &mut [Rgb24] {
        let len = self.len();
        &mut self.pixels[..len]
    }
}

impl Default for Tile {
    fn default() -> Self {
        Self::new()
    }
}

// ── TileDecoder ──────────────────────────────────────────────────

/// Counters for one decoded rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RectStats {
    pub tiles: usize,
    pub clipped_runs: usize,
}

pub struct TileDecoder {
    format: PixelFormat,
    policy: OverrunPolicy,
    palette: [Rgb24; MAX_PALETTE_SIZE],
    tile: Tile,
}

impl TileDecoder {
    pub fn new(format: PixelFormat, policy: OverrunPolicy) -> Self {
        Self {
            format,
            policy,
            palette: [0; MAX_PALETTE_SIZE],
            tile: Tile::new(),
        }
    }

    /// The most recently decoded tile.
    pub fn tile(&self) -> &Tile {
        &self.tile
    }

    /// Decode every tile of a `width × height` rectangle at `(x, y)` and
    /// write them to `fb`.
    ///
    /// A tile reaches the framebuffer only once it decoded completely,
    /// so a failure leaves earlier tiles applied and nothing half-written.
    pub fn decode_rectangle(
        &mut self,
        data: &[u8],
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        fb: &mut FrameBuffer,
    ) -> Result<RectStats, FbsError> {
        if !fb.contains(x, y, width, height) {
            return Err(FbsError::RectangleOutOfBounds {
                x,
                y,
                width,
                height,
                fb_width: fb.width(),
                fb_height: fb.height(),
            });
        }

        let mut cursor = ByteCursor::new(data);
        let mut stats = RectStats::default();

        for ty in (0..height).step_by(TILE_SIZE as usize) {
            let tile_h = TILE_SIZE.min(height - ty);
            for tx in (0..width).step_by(TILE_SIZE as usize) {
                let tile_w = TILE_SIZE.min(width - tx);
                stats.clipped_runs += self.decode_tile(&mut cursor, tile_w, tile_h)?;
                fb.write_tile(x + tx, y + ty, &self.tile);
                stats.tiles += 1;
            }
        }

        if cursor.remaining() > 0 {
            tracing::debug!(
                "{} trailing bytes after rectangle {width}x{height}+{x}+{y}",
                cursor.remaining()
            );
        }
        Ok(stats)
    }

    /// Decode one tile into the scratch [`Tile`]. Returns the number of
    /// runs clipped under [`OverrunPolicy::Clip`].
    pub fn decode_tile(
        &mut self,
        cursor: &mut ByteCursor<'_>,
        width: u16,
        height: u16,
    ) -> Result<usize, FbsError> {
        let subencoding = Subencoding::from_byte(cursor.read_u8()?);
        self.tile.resize(width, height);

        match subencoding {
            Subencoding::Solid => {
                let color = read_color(cursor, &self.format)?;
                self.tile.pixels_mut().fill(color);
                Ok(0)
            }
            Subencoding::Raw => {
                for px in self.tile.pixels_mut() {
                    *px = read_color(cursor, &self.format)?;
                }
                Ok(0)
            }
            Subencoding::PackedPalette { palette_size } => {
                self.read_palette(cursor, palette_size)?;
                self.decode_packed(cursor, palette_size)?;
                Ok(0)
            }
            Subencoding::PlainRle => self.decode_plain_rle(cursor),
            Subencoding::PackedRle { palette_size } => {
                self.read_palette(cursor, palette_size)?;
                self.decode_packed_rle(cursor, palette_size)
            }
        }
    }

    // ── Internal ─────────────────────────────────────────────────

    fn read_palette(&mut self, cursor: &mut ByteCursor<'_>, size: usize) -> Result<(), FbsError> {
        for entry in &mut self.palette[..size] {
            *entry = read_color(cursor, &self.format)?;
        }
        Ok(())
    }

    /// Indices are MSB-first and every row starts on a fresh byte.
    fn decode_packed(&mut self, cursor: &mut ByteCursor<'_>, palette_size: usize) -> Result<(), FbsError> {
        let bits = index_bits(palette_size);
        let mask = (1u32 << bits) - 1;
        let width = self.tile.width as usize;
        if width == 0 {
            return Ok(());
        }
        let palette = &self.palette;

        for row in self.tile.pixels_mut().chunks_exact_mut(width) {
            let mut byte = 0u32;
            let mut bits_left = 0u32;
            for px in row {
                if bits_left == 0 {
                    byte = u32::from(cursor.read_u8()?);
                    bits_left = 8;
                }
                bits_left -= bits;
                let index = ((byte >> bits_left) & mask) as usize;
                *px = palette_entry(palette, palette_size, index)?;
            }
        }
        Ok(())
    }

    fn decode_plain_rle(&mut self, cursor: &mut ByteCursor<'_>) -> Result<usize, FbsError> {
        let policy = self.policy;
        let format = self.format;
        let pixels = self.tile.pixels_mut();
        let mut pos = 0;
        let mut clipped = 0;

        while pos < pixels.len() {
            let color = read_color(cursor, &format)?;
            let run = read_run_length(cursor)?;
            pos = fill_run(pixels, pos, run, color, policy, &mut clipped)?;
        }
        Ok(clipped)
    }

    fn decode_packed_rle(&mut self, cursor: &mut ByteCursor<'_>, palette_size: usize) -> Result<usize, FbsError> {
        let policy = self.policy;
        let palette = &self.palette;
        let pixels = self.tile.pixels_mut();
        let mut pos = 0;
        let mut clipped = 0;

        while pos < pixels.len() {
            let flag = cursor.read_u8()?;
            let color = palette_entry(palette, palette_size, (flag & 0x7F) as usize)?;
            let run = if flag & 0x80 != 0 { read_run_length(cursor)? } else { 1 };
            pos = fill_run(pixels, pos, run, color, policy, &mut clipped)?;
        }
        Ok(clipped)
    }
}

fn read_color(cursor: &mut ByteCursor<'_>, format: &PixelFormat) -> Result<Rgb24, FbsError> {
    Ok(format.decode_cpixel(cursor.read_array::<CPIXEL_LEN>()?))
}

fn palette_entry(palette: &[Rgb24], size: usize, index: usize) -> Result<Rgb24, FbsError> {
    if index >= size {
        return Err(FbsError::InvalidPaletteIndex {
            index,
            palette_size: size,
        });
    }
    Ok(palette[index])
}

/// `1 + Σ bytes`, continuing while a byte equals 255.
pub fn read_run_length(cursor: &mut ByteCursor<'_>) -> Result<usize, FbsError> {
    let mut run = 1usize;
    loop {
        let byte = cursor.read_u8()?;
        run += byte as usize;
        if byte != 255 {
            return Ok(run);
        }
    }
}

/// Paint `run` pixels from `pos`, enforcing the overrun policy.
/// Returns the new write position.
fn fill_run(
    pixels: &mut [Rgb24],
    pos: usize,
    run: usize,
    color: Rgb24,
    policy: OverrunPolicy,
    clipped: &mut usize,
) -> Result<usize, FbsError> {
    let remaining = pixels.len() - pos;
    let run = if run > remaining {
        match policy {
            OverrunPolicy::Abort => return Err(FbsError::RunLengthOverrun { run, remaining }),
            OverrunPolicy::Clip => {
                warn!("clipping run of {run} pixels to {remaining}");
                *clipped += 1;
                remaining
            }
        }
    } else {
        run
    };
    pixels[pos..pos + run].fill(color);
    Ok(pos + run)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::rgb;
    use crate::zrle::encoder::TileEncoder;

    const RED: Rgb24 = rgb(255, 0, 0);
    const GREEN: Rgb24 = rgb(0, 255, 0);
    const BLUE: Rgb24 = rgb(0, 0, 255);

    fn decoder(policy: OverrunPolicy) -> TileDecoder {
        TileDecoder::new(PixelFormat::rgb888(), policy)
    }

    fn cpixel(c: Rgb24) -> [u8; 3] {
        PixelFormat::rgb888().encode_cpixel(c)
    }

    fn decode(bytes: &[u8], w: u16, h: u16, policy: OverrunPolicy) -> Result<(Vec<Rgb24>, usize), FbsError> {
        let mut dec = decoder(policy);
        let mut cursor = ByteCursor::new(bytes);
        let clipped = dec.decode_tile(&mut cursor, w, h)?;
        Ok((dec.tile().pixels().to_vec(), clipped))
    }

    #[test]
    fn subencoding_byte_maps_to_variant() {
        assert_eq!(Subencoding::from_byte(0x00), Subencoding::Raw);
        assert_eq!(Subencoding::from_byte(0x01), Subencoding::Solid);
        assert_eq!(Subencoding::from_byte(0x81), Subencoding::Solid);
        assert_eq!(Subencoding::from_byte(0x80), Subencoding::PlainRle);
        assert_eq!(
            Subencoding::from_byte(0x05),
            Subencoding::PackedPalette { palette_size: 5 }
        );
        assert_eq!(
            Subencoding::from_byte(0xFF),
            Subencoding::PackedRle { palette_size: 127 }
        );
        for byte in [0x00u8, 0x01, 0x80, 0x10, 0x83] {
            assert_eq!(Subencoding::from_byte(byte).to_byte(), byte);
        }
    }

    #[test]
    fn index_width_per_palette_size() {
        let widths: Vec<u32> = [1, 2, 4, 16, 128].into_iter().map(index_bits).collect();
        assert_eq!(widths, vec![1, 1, 2, 4, 8]);
        assert_eq!(index_bits(3), 2);
        assert_eq!(index_bits(5), 4);
        assert_eq!(index_bits(17), 8);
    }

    #[test]
    fn every_palette_size_fills_the_tile() {
        let (w, h) = (13u16, 7u16);
        let enc = TileEncoder::new(PixelFormat::rgb888());
        for size in [1usize, 2, 4, 16, 127] {
            let palette: Vec<Rgb24> = (0..size as u32).map(|i| rgb(i as u8, 0, 255 - i as u8)).collect();
            let pixels: Vec<Rgb24> = (0..(w as usize * h as usize)).map(|i| palette[i % size]).collect();

            let mut bytes = Vec::new();
            if size == 1 {
                enc.solid(&mut bytes, palette[0]);
            } else {
                enc.packed_palette(&mut bytes, &palette, &pixels, w as usize).unwrap();
            }

            let (decoded, _) = decode(&bytes, w, h, OverrunPolicy::Abort).unwrap();
            assert_eq!(decoded.len(), (w * h) as usize, "palette size {size}");
            assert_eq!(decoded, pixels, "palette size {size}");
        }
    }

    #[test]
    fn solid_tile() {
        let mut bytes = vec![0x01];
        bytes.extend(cpixel(BLUE));
        let (pixels, _) = decode(&bytes, 64, 64, OverrunPolicy::Abort).unwrap();
        assert_eq!(pixels.len(), 4096);
        assert!(pixels.iter().all(|&p| p == BLUE));
    }

    #[test]
    fn raw_tile() {
        let mut bytes = vec![0x00];
        for c in [RED, GREEN, BLUE, RED] {
            bytes.extend(cpixel(c));
        }
        let (pixels, _) = decode(&bytes, 2, 2, OverrunPolicy::Abort).unwrap();
        assert_eq!(pixels, vec![RED, GREEN, BLUE, RED]);
    }

    #[test]
    fn packed_rows_start_on_byte_boundary() {
        // Two colours, 3 pixels per row: indices 1,0,1 then 0,1,1.
        let mut bytes = vec![0x02];
        bytes.extend(cpixel(RED));
        bytes.extend(cpixel(GREEN));
        bytes.push(0b1010_0000);
        bytes.push(0b0110_0000);
        let (pixels, _) = decode(&bytes, 3, 2, OverrunPolicy::Abort).unwrap();
        assert_eq!(pixels, vec![GREEN, RED, GREEN, RED, GREEN, GREEN]);
    }

    #[test]
    fn run_length_continuation_bytes() {
        let data = [255u8, 255, 10];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(read_run_length(&mut cursor).unwrap(), 521);
        assert_eq!(cursor.remaining(), 0);

        // 521 red, then 3575 = 1 + 14 * 255 + 4 green.
        let mut bytes = vec![0x80];
        bytes.extend(cpixel(RED));
        bytes.extend([255, 255, 10]);
        bytes.extend(cpixel(GREEN));
        bytes.extend([255u8; 14]);
        bytes.push(4);
        let (pixels, clipped) = decode(&bytes, 64, 64, OverrunPolicy::Abort).unwrap();
        assert_eq!(clipped, 0);
        assert!(pixels[..521].iter().all(|&p| p == RED));
        assert!(pixels[521..].iter().all(|&p| p == GREEN));
    }

    #[test]
    fn packed_rle_tile() {
        let mut bytes = vec![0x83];
        for c in [RED, GREEN, BLUE] {
            bytes.extend(cpixel(c));
        }
        // index 2 once, index 0 run of 3, index 1 run of 2
        bytes.extend([0x02, 0x80, 2, 0x81, 1]);
        let (pixels, _) = decode(&bytes, 3, 2, OverrunPolicy::Abort).unwrap();
        assert_eq!(pixels, vec![BLUE, RED, RED, RED, GREEN, GREEN]);
    }

    #[test]
    fn overrun_aborts_by_default() {
        let mut bytes = vec![0x80];
        bytes.extend(cpixel(RED));
        bytes.push(9); // run of 10 into a 4-pixel tile
        let err = decode(&bytes, 2, 2, OverrunPolicy::Abort).unwrap_err();
        assert!(matches!(err, FbsError::RunLengthOverrun { run: 10, remaining: 4 }));
    }

    #[test]
    fn overrun_clips_when_asked() {
        let mut bytes = vec![0x82];
        bytes.extend(cpixel(RED));
        bytes.extend(cpixel(GREEN));
        bytes.extend([0x00, 0x81, 200]); // 1 red, then 201 green into 3 pixels
        let (pixels, clipped) = decode(&bytes, 2, 2, OverrunPolicy::Clip).unwrap();
        assert_eq!(clipped, 1);
        assert_eq!(pixels, vec![RED, GREEN, GREEN, GREEN]);
    }

    #[test]
    fn palette_index_out_of_range() {
        let mut bytes = vec![0x82];
        bytes.extend(cpixel(RED));
        bytes.extend(cpixel(GREEN));
        bytes.push(0x05);
        let err = decode(&bytes, 2, 2, OverrunPolicy::Abort).unwrap_err();
        assert!(matches!(err, FbsError::InvalidPaletteIndex { index: 5, palette_size: 2 }));

        // Three colours use 2-bit indices, so index 3 is representable but invalid.
        let mut bytes = vec![0x03];
        for c in [RED, GREEN, BLUE] {
            bytes.extend(cpixel(c));
        }
        bytes.push(0b1100_0000);
        assert!(decode(&bytes, 1, 1, OverrunPolicy::Abort).is_err());
    }

    #[test]
    fn short_data_is_exhausted_not_panic() {
        let mut bytes = vec![0x00];
        bytes.extend(cpixel(RED));
        let err = decode(&bytes, 2, 2, OverrunPolicy::Abort).unwrap_err();
        assert!(matches!(err, FbsError::Exhausted { .. }));
        assert!(matches!(decode(&[], 1, 1, OverrunPolicy::Abort), Err(FbsError::Exhausted { .. })));
    }

    #[test]
    fn rectangle_is_split_into_clipped_tiles() {
        let (w, h) = (130u16, 70u16);
        let mut bytes = Vec::new();
        // 3 columns × 2 rows of tiles, each solid with its own colour.
        let colors: Vec<Rgb24> = (0..6u8).map(|i| rgb(i * 40, 255 - i * 40, i)).collect();
        for &c in &colors {
            bytes.push(0x01);
            bytes.extend(cpixel(c));
        }

        let mut fb = FrameBuffer::new(140, 80);
        let mut dec = decoder(OverrunPolicy::Abort);
        let stats = dec.decode_rectangle(&bytes, 5, 3, w, h, &mut fb).unwrap();
        assert_eq!(stats.tiles, 6);

        let expect = |c: Rgb24| Some(crate::pixel::rgb_bytes(c));
        assert_eq!(fb.pixel(5, 3), expect(colors[0]));
        assert_eq!(fb.pixel(5 + 64, 3), expect(colors[1]));
        assert_eq!(fb.pixel(5 + 129, 3), expect(colors[2]));
        assert_eq!(fb.pixel(5, 3 + 64), expect(colors[3]));
        assert_eq!(fb.pixel(5 + 129, 3 + 69), expect(colors[5]));
        assert_eq!(fb.pixel(5 + 130, 3), Some([0, 0, 0]));
        assert_eq!(fb.pixel(5, 3 + 70), Some([0, 0, 0]));
    }

    #[test]
    fn failed_tile_leaves_framebuffer_untouched() {
        let mut bytes = vec![0x01];
        bytes.extend(cpixel(RED));
        bytes.push(0x00); // second tile raw, but no data follows

        let mut fb = FrameBuffer::new(128, 64);
        let mut dec = decoder(OverrunPolicy::Abort);
        assert!(dec.decode_rectangle(&bytes, 0, 0, 128, 64, &mut fb).is_err());
        assert_eq!(fb.pixel(0, 0), Some([255, 0, 0]));
        assert_eq!(fb.pixel(64, 0), Some([0, 0, 0]));
    }
}
