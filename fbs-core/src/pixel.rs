//! Pixel layout of a recording.
//!
//! Parsed once from the ServerInit handshake record and never changed
//! afterwards. Only 32 bpp true-colour layouts with at most 24 colour
//! bits are decodable; ZRLE sends those as 3-byte "compact pixels".

use crate::be;
use crate::error::FbsError;

/// Size of the pixel-format block inside ServerInit.
pub const PIXEL_FORMAT_LEN: usize = 16;

/// Bytes in one ZRLE colour entry for a 32 bpp layout.
pub const CPIXEL_LEN: usize = 3;

/// Packed `0x00RRGGBB` colour.
pub type Rgb24 = u32;

pub const fn rgb(r: u8, g: u8, b: u8) -> Rgb24 {
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

/// Split a packed colour into `[r, g, b]`.
pub const fn rgb_bytes(c: Rgb24) -> [u8; 3] {
    [(c >> 16) as u8, (c >> 8) as u8, c as u8]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_color: bool,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// The common 32 bpp little-endian layout (`0x00RRGGBB` pixels).
    pub const fn rgb888() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: false,
            true_color: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// Parse the 16-byte block (3 trailing padding bytes ignored).
    pub fn parse(block: &[u8]) -> Result<Self, FbsError> {
        if block.len() < 13 {
            return Err(FbsError::Truncated {
                what: "pixel format",
                needed: 13,
                available: block.len(),
            });
        }
        Ok(Self {
            bits_per_pixel: block[0],
            depth: block[1],
            big_endian: block[2] != 0,
            true_color: block[3] != 0,
            red_max: be::read_u16(block, 4, "pixel format")?,
            green_max: be::read_u16(block, 6, "pixel format")?,
            blue_max: be::read_u16(block, 8, "pixel format")?,
            red_shift: block[10],
            green_shift: block[11],
            blue_shift: block[12],
        })
    }

    pub fn to_bytes(&self) -> [u8; PIXEL_FORMAT_LEN] {
        let mut buf = [0u8; PIXEL_FORMAT_LEN];
        buf[0] = self.bits_per_pixel;
        buf[1] = self.depth;
        buf[2] = self.big_endian as u8;
        buf[3] = self.true_color as u8;
        buf[4..6].copy_from_slice(&self.red_max.to_be_bytes());
        buf[6..8].copy_from_slice(&self.green_max.to_be_bytes());
        buf[8..10].copy_from_slice(&self.blue_max.to_be_bytes());
        buf[10] = self.red_shift;
        buf[11] = self.green_shift;
        buf[12] = self.blue_shift;
        buf
    }

    /// Which three bytes of the 4-byte pixel a compact pixel carries.
    ///
    /// Little-endian layouts must fit in the low 24 bits and big-endian
    /// layouts must leave the lowest byte empty. Anything else has no
    /// 3-byte form.
    fn cpixel_layout(&self) -> Option<CpixelLayout> {
        if self.bits_per_pixel != 32 || !self.true_color || self.depth > 24 {
            return None;
        }
        let max_pixel = field_mask(self.red_max, self.red_shift)
            | field_mask(self.green_max, self.green_shift)
            | field_mask(self.blue_max, self.blue_shift);
        let fits_low = max_pixel < 1 << 24;
        let fits_high = max_pixel <= u64::from(u32::MAX) && max_pixel & 0xFF == 0;
        match (self.big_endian, fits_low, fits_high) {
            (false, true, _) => Some(CpixelLayout::Low),
            (true, _, true) => Some(CpixelLayout::High),
            _ => None,
        }
    }

    /// Open-time capability check.
    ///
    /// 8 and 16 bpp (and colour-mapped) layouts are valid RFB formats
    /// but have no decoder here. Neither do 32 bpp layouts whose colour
    /// bits do not fit the three bytes ZRLE sends.
    pub fn ensure_supported(&self) -> Result<(), FbsError> {
        match self.cpixel_layout() {
            Some(_) => Ok(()),
            None => Err(FbsError::UnsupportedPixelFormat {
                bits_per_pixel: self.bits_per_pixel,
                depth: self.depth,
                true_color: self.true_color,
            }),
        }
    }

    /// Convert a compact pixel to packed RGB.
    ///
    /// Little-endian layouts send the low three bytes of the pixel
    /// value, big-endian layouts the high three. Channels narrower than
    /// 8 bits are scaled up to the full range. Only meaningful once
    /// [`ensure_supported`](Self::ensure_supported) has passed.
    pub fn decode_cpixel(&self, bytes: [u8; CPIXEL_LEN]) -> Rgb24 {
        let [a, b, c] = bytes.map(u32::from);
        let value = if self.big_endian {
            a << 24 | b << 16 | c << 8
        } else {
            a | b << 8 | c << 16
        };
        rgb(
            channel(value, self.red_shift, self.red_max),
            channel(value, self.green_shift, self.green_max),
            channel(value, self.blue_shift, self.blue_max),
        )
    }

    /// Inverse of [`decode_cpixel`](Self::decode_cpixel) for 8-bit channels.
    pub fn encode_cpixel(&self, color: Rgb24) -> [u8; CPIXEL_LEN] {
        let [r, g, b] = rgb_bytes(color);
        let value = place(unscale(r, self.red_max), self.red_shift)
            | place(unscale(g, self.green_max), self.green_shift)
            | place(unscale(b, self.blue_max), self.blue_shift);
        if self.big_endian {
            [(value >> 24) as u8, (value >> 16) as u8, (value >> 8) as u8]
        } else {
            [value as u8, (value >> 8) as u8, (value >> 16) as u8]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CpixelLayout {
    /// Bytes 0..3 of a little-endian pixel.
    Low,
    /// Bytes 0..3 of a big-endian pixel (the three most significant).
    High,
}

fn field_mask(max: u16, shift: u8) -> u64 {
    u64::from(max).checked_shl(u32::from(shift)).unwrap_or(u64::MAX)
}

fn place(component: u32, shift: u8) -> u32 {
    component.checked_shl(u32::from(shift)).unwrap_or(0)
}

fn channel(value: u32, shift: u8, max: u16) -> u8 {
    let max = u32::from(max);
    if max == 0 {
        return 0;
    }
    let raw = value.checked_shr(u32::from(shift)).unwrap_or(0) & max;
    if max == 255 {
        raw as u8
    } else {
        ((raw * 255 + max / 2) / max).min(255) as u8
    }
}

fn unscale(component: u8, max: u16) -> u32 {
    let max = u32::from(max);
    if max == 255 {
        u32::from(component)
    } else {
        (u32::from(component) * max + 127) / 255
    }
}
