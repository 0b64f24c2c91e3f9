//! Recording writer.
//!
//! Produces files [`ContainerHeader::read`](super::ContainerHeader::read)
//! and the session accept: signature, a synthetic server handshake and
//! then padded, timestamped update records.

use std::io::Write;

use crate::container::header::{MAGIC, ProtocolVersion};
use crate::container::record::padded_len;
use crate::error::FbsError;
use crate::pixel::PixelFormat;

/// RFB security type "None".
const SECURITY_NONE: u8 = 1;

pub struct RecordingWriter<W: Write> {
    inner: W,
    written: u64,
    last_timestamp: u32,
}

impl<W: Write> RecordingWriter<W> {
    /// Write the signature and handshake records (all at timestamp 0).
    pub fn start(
        inner: W,
        version: ProtocolVersion,
        width: u16,
        height: u16,
        format: &PixelFormat,
        desktop_name: &str,
    ) -> Result<Self, FbsError> {
        let mut writer = Self {
            inner,
            written: 0,
            last_timestamp: 0,
        };
        writer.inner.write_all(MAGIC)?;
        writer.inner.write_all(b"\n")?;
        writer.written = 12;

        writer.write_record(version.version_string(), 0)?;
        match version {
            ProtocolVersion::V3_3 => writer.write_record(&u32::from(SECURITY_NONE).to_be_bytes(), 0)?,
            _ => writer.write_record(&[1, SECURITY_NONE], 0)?,
        };
        if version.has_security_result() {
            writer.write_record(&0u32.to_be_bytes(), 0)?;
        }

        let name = desktop_name.as_bytes();
        let mut init = Vec::with_capacity(24);
        init.extend_from_slice(&width.to_be_bytes());
        init.extend_from_slice(&height.to_be_bytes());
        init.extend_from_slice(&format.to_bytes());
        init.extend_from_slice(&(name.len() as u32).to_be_bytes());
        writer.write_record(&init, 0)?;
        writer.write_record(name, 0)?;

        Ok(writer)
    }

    /// Append one record. Returns its byte offset.
    pub fn write_record(&mut self, payload: &[u8], timestamp_ms: u32) -> Result<u64, FbsError> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            FbsError::Format(format!("record of {} bytes does not fit", payload.len()))
        })?;
        let padding = padded_len(payload.len()) - payload.len();

        let offset = self.written;
        self.inner.write_all(&len.to_be_bytes())?;
        self.inner.write_all(payload)?;
        self.inner.write_all(&[0u8; 3][..padding])?;
        self.inner.write_all(&timestamp_ms.to_be_bytes())?;

        self.written += (8 + payload.len() + padding) as u64;
        self.last_timestamp = timestamp_ms;
        Ok(offset)
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.written
    }

    pub fn last_timestamp(&self) -> u32 {
        self.last_timestamp
    }

    /// Flush and hand back the sink.
    pub fn finish(mut self) -> Result<W, FbsError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::record::RecordReader;
    use std::io::Cursor;

    #[test]
    fn records_are_padded_and_stamped() {
        let mut w = RecordingWriter::start(
            Vec::new(),
            ProtocolVersion::V3_7,
            8,
            8,
            &PixelFormat::rgb888(),
            "",
        )
        .unwrap();
        let start = w.position();
        let at = w.write_record(&[1, 2, 3, 4, 5], 250).unwrap();
        assert_eq!(at, start);
        assert_eq!(w.position(), start + 16);
        assert_eq!(w.last_timestamp(), 250);

        let bytes = w.finish().unwrap();
        assert_eq!(&bytes[..12], b"FBS 001.000\n");
        assert_eq!(&bytes[bytes.len() - 4..], &250u32.to_be_bytes());

        let mut reader =
            RecordReader::new(Cursor::new(&bytes[start as usize..]), start, u32::MAX);
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.payload, vec![1, 2, 3, 4, 5]);
        assert_eq!(record.timestamp_ms, 250);
    }
}
