//! Big-endian field access.
//!
//! Two flavours: stateless offset reads over a whole buffer (record
//! and header fields), and a [`ByteCursor`] that walks decompressed
//! tile data one byte at a time.

use bytes::Buf;

use crate::error::FbsError;

/// Read a big-endian `u16` at `at`.
pub fn read_u16(data: &[u8], at: usize, what: &'static str) -> Result<u16, FbsError> {
    let mut field = field(data, at, 2, what)?;
    Ok(field.get_u16())
}

/// Read a big-endian `u32` at `at`.
pub fn read_u32(data: &[u8], at: usize, what: &'static str) -> Result<u32, FbsError> {
    let mut field = field(data, at, 4, what)?;
    Ok(field.get_u32())
}

fn field<'a>(
    data: &'a [u8],
    at: usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], FbsError> {
    let end = at.saturating_add(len);
    data.get(at..end).ok_or(FbsError::Truncated {
        what,
        needed: end,
        available: data.len(),
    })
}

// ── ByteCursor ───────────────────────────────────────────────────

/// Forward-only reader over decompressed rectangle data.
///
/// Running out of bytes is reported as [`FbsError::Exhausted`]; the
/// cursor never panics.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            buf: data,
            len: data.len(),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, FbsError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read exactly `N` bytes.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], FbsError> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.len - self.buf.remaining()
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), FbsError> {
        if self.buf.remaining() < needed {
            return Err(FbsError::Exhausted {
                needed,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }
}
