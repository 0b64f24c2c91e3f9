//! Record framing.
//!
//! Every record, handshake or data, is laid out as
//!
//! ```text
//! u32 BE   payload length
//! [u8]     payload, zero-padded to a multiple of 4
//! u32 BE   timestamp in milliseconds since recording start
//! ```

use std::io::{self, Read, Seek, SeekFrom};

use crate::error::FbsError;

/// Length field plus timestamp.
pub const RECORD_OVERHEAD: usize = 8;

/// Payload length rounded up to the next multiple of 4.
pub const fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// One record read from the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    /// Byte offset of the length field.
    pub offset: u64,
    /// Payload with the padding stripped.
    pub payload: Vec<u8>,
    pub timestamp_ms: u32,
}

impl FrameRecord {
    /// Bytes the record occupies in the file.
    pub fn encoded_len(&self) -> usize {
        RECORD_OVERHEAD + padded_len(self.payload.len())
    }
}

// ── RecordReader ─────────────────────────────────────────────────

/// Sequential reader of length-prefixed records.
#[derive(Debug)]
pub struct RecordReader<R> {
    inner: R,
    offset: u64,
    max_len: u32,
}

impl<R: Read> RecordReader<R> {
    /// `offset` is the current position of `inner` within the file.
    pub fn new(inner: R, offset: u64, max_len: u32) -> Self {
        Self {
            inner,
            offset,
            max_len,
        }
    }

    /// Read the next record. `Ok(None)` on a clean end of input.
    pub fn next_record(&mut self) -> Result<Option<FrameRecord>, FbsError> {
        let offset = self.offset;

        let mut len_buf = [0u8; 4];
        match read_full(&mut self.inner, &mut len_buf)? {
            0 => return Ok(None),
            4 => {}
            n => {
                return Err(FbsError::Truncated {
                    what: "record length",
                    needed: 4,
                    available: n,
                });
            }
        }
        let len = u32::from_be_bytes(len_buf);
        if len > self.max_len {
            return Err(FbsError::OverflowGuard {
                what: "record",
                declared: u64::from(len),
                max: u64::from(self.max_len),
            });
        }

        let len = len as usize;
        let body_len = padded_len(len) + 4;
        let mut body = vec![0u8; body_len];
        let n = read_full(&mut self.inner, &mut body)?;
        if n < body_len {
            return Err(FbsError::Truncated {
                what: "record",
                needed: body_len,
                available: n,
            });
        }

        let timestamp_ms = crate::be::read_u32(&body, body_len - 4, "record timestamp")?;
        body.truncate(len);
        self.offset += (4 + body_len) as u64;

        Ok(Some(FrameRecord {
            offset,
            payload: body,
            timestamp_ms,
        }))
    }

    /// Offset of the next record.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> RecordReader<R> {
    /// Reposition to an absolute record boundary.
    pub fn rewind_to(&mut self, offset: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }
}

/// Fill `buf` as far as the input allows; returns the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
