//! Persistent RGB8 image reconstructed from incremental updates.
//!
//! Updates only ever touch the rectangles they carry, so the buffer is
//! never cleared between frames. The only full reset is the rewind a
//! seek performs.

use crate::pixel::{Rgb24, rgb_bytes};
use crate::zrle::tile::Tile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u16,
    height: u16,
    /// `width * height * 3` bytes, rows top to bottom, R G B per pixel.
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Allocate a black framebuffer.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * 3],
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// The whole image.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * 3
    }

    /// `[r, g, b]` at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u16, y: u16) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = y as usize * self.stride() + x as usize * 3;
        Some([self.data[at], self.data[at + 1], self.data[at + 2]])
    }

    /// Whether a `width × height` region at `(x, y)` lies inside the image.
    pub fn contains(&self, x: u16, y: u16, width: u16, height: u16) -> bool {
        u32::from(x) + u32::from(width) <= u32::from(self.width)
            && u32::from(y) + u32::from(height) <= u32::from(self.height)
    }

    /// Copy a decoded tile to `(x, y)`.
    ///
    /// The caller has checked the enclosing rectangle with
    /// [`contains`](Self::contains); pixels that would still fall
    /// outside are dropped.
    pub fn write_tile(&mut self, x: u16, y: u16, tile: &Tile) {
        let width = (tile.width() as usize).min((self.width as usize).saturating_sub(x as usize));
        let height =
            (tile.height() as usize).min((self.height as usize).saturating_sub(y as usize));
        let stride = self.stride();

        for row in 0..height {
            let src = &tile.row(row)[..width];
            let start = (y as usize + row) * stride + x as usize * 3;
            let dst = &mut self.data[start..start + width * 3];
            for (out, &color) in dst.chunks_exact_mut(3).zip(src) {
                out.copy_from_slice(&rgb_bytes(color));
            }
        }
    }

    /// Paint the whole image one colour.
    pub fn fill(&mut self, color: Rgb24) {
        let bytes = rgb_bytes(color);
        for px in self.data.chunks_exact_mut(3) {
            px.copy_from_slice(&bytes);
        }
    }

    /// Back to black. Used when replaying from the start of the data.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::rgb;

    #[test]
    fn starts_black() {
        let fb = FrameBuffer::new(4, 2);
        assert_eq!(fb.as_bytes().len(), 24);
        assert!(fb.as_bytes().iter().all(|&b| b == 0));
        assert_eq!(fb.pixel(4, 0), None);
    }

    #[test]
    fn tile_lands_at_offset_in_rgb_order() {
        let mut fb = FrameBuffer::new(8, 8);
        let mut tile = Tile::new();
        tile.fill(2, 3, rgb(0x11, 0x22, 0x33));

        fb.write_tile(5, 4, &tile);

        assert_eq!(fb.pixel(5, 4), Some([0x11, 0x22, 0x33]));
        assert_eq!(fb.pixel(6, 6), Some([0x11, 0x22, 0x33]));
        assert_eq!(fb.pixel(4, 4), Some([0, 0, 0]));
        assert_eq!(fb.pixel(7, 4), Some([0, 0, 0]));
        assert_eq!(fb.pixel(5, 7), Some([0, 0, 0]));
    }

    #[test]
    fn partial_updates_accumulate() {
        let mut fb = FrameBuffer::new(4, 4);
        fb.fill(rgb(9, 9, 9));

        let mut tile = Tile::new();
        tile.fill(1, 1, rgb(1, 2, 3));
        fb.write_tile(0, 0, &tile);

        assert_eq!(fb.pixel(0, 0), Some([1, 2, 3]));
        assert_eq!(fb.pixel(3, 3), Some([9, 9, 9]));

        fb.clear();
        assert_eq!(fb.pixel(3, 3), Some([0, 0, 0]));
    }

    #[test]
    fn clipped_write_stays_in_bounds() {
        let mut fb = FrameBuffer::new(3, 3);
        let mut tile = Tile::new();
        tile.fill(4, 4, rgb(7, 7, 7));
        fb.write_tile(1, 1, &tile);
        assert_eq!(fb.pixel(2, 2), Some([7, 7, 7]));
        assert_eq!(fb.pixel(0, 0), Some([0, 0, 0]));
        assert!(fb.contains(0, 0, 3, 3));
        assert!(!fb.contains(1, 0, 3, 3));
    }
}
