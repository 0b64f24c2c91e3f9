//! Container signature and RFB handshake.
//!
//! After the 12-byte signature the file replays the server side of the
//! RFB handshake as ordinary records:
//!
//! 1. protocol version string (`RFB 003.008\n`)
//! 2. security negotiation
//! 3. security result (absent for protocol 3.3)
//! 4. ServerInit: width, height, pixel format
//! 5. desktop name
//!
//! Update records start right after.

use std::io::{Read, Seek, SeekFrom};

use crate::be;
use crate::config::DEFAULT_MAX_RECORD_LEN;
use crate::container::record::RecordReader;
use crate::error::FbsError;
use crate::pixel::{PIXEL_FORMAT_LEN, PixelFormat};

/// Signature checked at offset 0.
pub const MAGIC: &[u8; 11] = b"FBS 001.000";

/// Signature plus the newline after it.
pub const MAGIC_LEN: usize = 12;

/// width + height + pixel format.
pub const SERVER_INIT_MIN_LEN: usize = 4 + PIXEL_FORMAT_LEN;

/// Index of the minor version digit in the version string.
const VERSION_DIGIT: usize = 10;

// ── ProtocolVersion ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V3_3,
    V3_7,
    V3_8,
}

impl ProtocolVersion {
    /// Parse the minor digit of an `RFB 003.00X` string.
    pub fn from_digit(digit: u8) -> Result<Self, FbsError> {
        match digit {
            b'3' => Ok(ProtocolVersion::V3_3),
            b'7' => Ok(ProtocolVersion::V3_7),
            b'8' => Ok(ProtocolVersion::V3_8),
            other => Err(FbsError::Format(format!(
                "unknown RFB minor version {:?}",
                char::from(other)
            ))),
        }
    }

    pub fn version_string(self) -> &'static [u8; 12] {
        match self {
            ProtocolVersion::V3_3 => b"RFB 003.003\n",
            ProtocolVersion::V3_7 => b"RFB 003.007\n",
            ProtocolVersion::V3_8 => b"RFB 003.008\n",
        }
    }

    /// 3.3 servers pick the security type themselves and send no result.
    pub fn has_security_result(self) -> bool {
        self != ProtocolVersion::V3_3
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProtocolVersion::V3_3 => "3.3",
            ProtocolVersion::V3_7 => "3.7",
            ProtocolVersion::V3_8 => "3.8",
        };
        f.write_str(s)
    }
}

// ── ContainerHeader ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: ProtocolVersion,
    pub width: u16,
    pub height: u16,
    pub pixel_format: PixelFormat,
    pub desktop_name: String,
    /// Offset of the first update record; the rewind target for seeks.
    pub data_start: u64,
}

impl ContainerHeader {
    /// Read the signature and handshake from the start of `source`,
    /// leaving it positioned at `data_start`.
    pub fn read<R: Read>(source: &mut R) -> Result<Self, FbsError> {
        let mut magic = [0u8; MAGIC_LEN];
        let mut filled = 0;
        while filled < MAGIC_LEN {
            match source.read(&mut magic[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        if filled < MAGIC.len() || &magic[..MAGIC.len()] != MAGIC {
            return Err(FbsError::InvalidMagic);
        }
        if filled < MAGIC_LEN {
            return Err(FbsError::Truncated {
                what: "signature",
                needed: MAGIC_LEN,
                available: filled,
            });
        }

        let mut records = RecordReader::new(source, MAGIC_LEN as u64, DEFAULT_MAX_RECORD_LEN);
        let mut handshake = |what: &'static str| -> Result<Vec<u8>, FbsError> {
            match records.next_record()? {
                Some(record) => Ok(record.payload),
                None => Err(FbsError::Truncated {
                    what,
                    needed: 4,
                    available: 0,
                }),
            }
        };

        let version_record = handshake("version record")?;
        let digit = *version_record
            .get(VERSION_DIGIT)
            .ok_or(FbsError::Truncated {
                what: "version record",
                needed: VERSION_DIGIT + 1,
                available: version_record.len(),
            })?;
        let version = ProtocolVersion::from_digit(digit)?;

        handshake("security record")?;
        if version.has_security_result() {
            handshake("security result")?;
        }

        let init = handshake("server init")?;
        if init.len() < SERVER_INIT_MIN_LEN {
            return Err(FbsError::Truncated {
                what: "server init",
                needed: SERVER_INIT_MIN_LEN,
                available: init.len(),
            });
        }
        let width = be::read_u16(&init, 0, "server init")?;
        let height = be::read_u16(&init, 2, "server init")?;
        if width == 0 || height == 0 {
            return Err(FbsError::Format(format!(
                "framebuffer geometry {width}x{height}"
            )));
        }
        let pixel_format = PixelFormat::parse(&init[4..SERVER_INIT_MIN_LEN])?;

        let name = handshake("desktop name")?;
        let desktop_name = String::from_utf8_lossy(&name)
            .trim_end_matches('\0')
            .to_owned();

        Ok(Self {
            version,
            width,
            height,
            pixel_format,
            desktop_name,
            data_start: records.offset(),
        })
    }
}

/// Total duration in ms: the timestamp in the last 4 bytes.
///
/// The position of `source` is restored afterwards.
pub fn read_trailing_timestamp<R: Read + Seek>(source: &mut R) -> Result<u32, FbsError> {
    let pos = source.stream_position()?;
    let end = source.seek(SeekFrom::End(0))?;
    if end < 4 {
        source.seek(SeekFrom::Start(pos))?;
        return Err(FbsError::Truncated {
            what: "trailing timestamp",
            needed: 4,
            available: end as usize,
        });
    }

    source.seek(SeekFrom::Start(end - 4))?;
    let mut buf = [0u8; 4];
    let read = source.read_exact(&mut buf);
    source.seek(SeekFrom::Start(pos))?;
    read?;
    Ok(u32::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::writer::RecordingWriter;
    use std::io::Cursor;

    fn recording(version: ProtocolVersion) -> Vec<u8> {
        let mut w = RecordingWriter::start(
            Vec::new(),
            version,
            320,
            200,
            &PixelFormat::rgb888(),
            "desk",
        )
        .unwrap();
        w.write_record(&[9, 9], 777).unwrap();
        w.finish().unwrap()
    }

    #[test]
    fn reads_3_8_handshake() {
        let data = recording(ProtocolVersion::V3_8);
        let mut cursor = Cursor::new(&data);
        let header = ContainerHeader::read(&mut cursor).unwrap();
        assert_eq!(header.version, ProtocolVersion::V3_8);
        assert_eq!((header.width, header.height), (320, 200));
        assert_eq!(header.pixel_format, PixelFormat::rgb888());
        assert_eq!(header.desktop_name, "desk");
        assert_eq!(cursor.position(), header.data_start);
        // signature + version + security + result + init + name
        assert_eq!(header.data_start, 12 + 20 + 12 + 12 + 32 + 12);
    }

    #[test]
    fn protocol_3_3_has_no_security_result() {
        let data = recording(ProtocolVersion::V3_3);
        let header = ContainerHeader::read(&mut Cursor::new(&data)).unwrap();
        assert_eq!(header.version, ProtocolVersion::V3_3);
        assert_eq!(header.data_start, 12 + 20 + 12 + 32 + 12);
    }

    #[test]
    fn bad_magic() {
        let mut data = recording(ProtocolVersion::V3_8);
        data[0] = b'X';
        let err = ContainerHeader::read(&mut Cursor::new(&data)).unwrap_err();
        assert!(matches!(err, FbsError::InvalidMagic));
        assert!(err.is_format_error());
        assert!(matches!(
            ContainerHeader::read(&mut Cursor::new(b"FBS")),
            Err(FbsError::InvalidMagic)
        ));
    }

    #[test]
    fn unknown_version_digit() {
        let mut data = recording(ProtocolVersion::V3_8);
        // length field (4) then "RFB 003.00" → digit at 12 + 4 + 10.
        data[26] = b'5';
        let err = ContainerHeader::read(&mut Cursor::new(&data)).unwrap_err();
        assert!(matches!(err, FbsError::Format(_)));
    }

    #[test]
    fn truncated_handshake() {
        let data = recording(ProtocolVersion::V3_8);
        for cut in [12, 40, 60] {
            let err = ContainerHeader::read(&mut Cursor::new(&data[..cut])).unwrap_err();
            assert!(err.is_format_error(), "cut at {cut}: {err}");
        }
    }

    #[test]
    fn trailing_timestamp_restores_position() {
        let data = recording(ProtocolVersion::V3_8);
        let mut cursor = Cursor::new(&data);
        cursor.set_position(5);
        assert_eq!(read_trailing_timestamp(&mut cursor).unwrap(), 777);
        assert_eq!(cursor.position(), 5);

        let mut tiny = Cursor::new(vec![1u8, 2, 3]);
        assert!(matches!(
            read_trailing_timestamp(&mut tiny),
            Err(FbsError::Truncated { .. })
        ));
    }
}
