//! Binary PPM (P6) snapshots of the framebuffer.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use fbs_core::FrameBuffer;

pub fn write_ppm<W: Write>(mut out: W, fb: &FrameBuffer) -> io::Result<()> {
    write!(out, "P6\n{} {}\n255\n", fb.width(), fb.height())?;
    out.write_all(fb.as_bytes())?;
    out.flush()
}

pub fn save_ppm(path: &Path, fb: &FrameBuffer) -> io::Result<()> {
    write_ppm(BufWriter::new(File::create(path)?), fb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbs_core::pixel::rgb;

    #[test]
    fn header_then_rgb_rows() {
        let mut fb = FrameBuffer::new(2, 1);
        fb.fill(rgb(1, 2, 3));
        let mut out = Vec::new();
        write_ppm(&mut out, &fb).unwrap();
        assert_eq!(out, b"P6\n2 1\n255\n\x01\x02\x03\x01\x02\x03");
    }

    #[test]
    fn saves_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.ppm");
        save_ppm(&path, &FrameBuffer::new(3, 3)).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 11 + 27);
    }
}
