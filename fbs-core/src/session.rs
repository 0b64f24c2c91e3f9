//! Decode session.
//!
//! A [`Session`] owns everything one playback needs: the byte source,
//! the parsed header, the session-long zlib context and the
//! framebuffer. Records are pulled in file order; each one mutates the
//! framebuffer and the caller reads the result.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::DecoderConfig;
use crate::container::{ContainerHeader, FrameRecord, RecordReader, read_trailing_timestamp};
use crate::error::FbsError;
use crate::framebuffer::FrameBuffer;
use crate::zrle::{FrameDecoder, FrameReport};

/// Geometry and length of an open recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u16,
    pub height: u16,
    /// Timestamp of the last record.
    pub duration_ms: u32,
}

/// The framebuffer after one record.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// `width * height * 3` RGB bytes.
    pub rgb: &'a [u8],
    pub width: u16,
    pub height: u16,
    pub timestamp_ms: u32,
    pub report: FrameReport,
}

pub struct Session<R> {
    pub(crate) records: RecordReader<R>,
    pub(crate) header: ContainerHeader,
    pub(crate) duration_ms: u32,
    pub(crate) decoder: FrameDecoder,
    pub(crate) framebuffer: FrameBuffer,
    /// Record read ahead by [`advance_to`](Session::advance_to) but not
    /// yet decoded.
    pub(crate) pending: Option<FrameRecord>,
    pub(crate) position_ms: u32,
    pub(crate) desynchronized: bool,
}

impl Session<BufReader<File>> {
    /// Open a recording on disk.
    pub fn open_path(path: impl AsRef<Path>, config: DecoderConfig) -> Result<Self, FbsError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!("opening {}", path.display());
        Session::open(BufReader::new(file), config)
    }
}

impl<R: Read + Seek> Session<R> {
    /// Validate the container, parse the handshake and prepare a black
    /// framebuffer. `source` must be positioned at the start of the
    /// recording.
    ///
    /// Fails before any frame is produced if the file is not an FBS
    /// recording or its pixel format cannot be decoded.
    pub fn open(mut source: R, config: DecoderConfig) -> Result<Self, FbsError> {
        let header = ContainerHeader::read(&mut source)?;
        header.pixel_format.ensure_supported()?;
        let duration_ms = read_trailing_timestamp(&mut source)?;

        info!(
            "opened RFB {} recording \"{}\": {}x{}, {} ms",
            header.version, header.desktop_name, header.width, header.height, duration_ms
        );

        Ok(Self {
            records: RecordReader::new(source, header.data_start, config.max_record_len),
            decoder: FrameDecoder::new(header.pixel_format, &config),
            framebuffer: FrameBuffer::new(header.width, header.height),
            header,
            duration_ms,
            pending: None,
            position_ms: 0,
            desynchronized: false,
        })
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            width: self.header.width,
            height: self.header.height,
            duration_ms: self.duration_ms,
        }
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Decode the next record. `Ok(None)` at the end of the recording.
    ///
    /// An error that leaves the zlib stream out of step marks the
    /// session desynchronized: every later call fails with
    /// [`FbsError::Desynchronized`] until [`seek`](Session::seek).
    pub fn next_frame(&mut self) -> Result<Option<Frame<'_>>, FbsError> {
        let Some(record) = self.read_record()? else {
            return Ok(None);
        };
        let report = self.apply(&record)?;
        Ok(Some(self.frame(report)))
    }

    /// Decode every record stamped at or before `target_ms`.
    ///
    /// Frame errors that keep the stream in step are logged and
    /// skipped. Returns the number of records decoded.
    pub fn advance_to(&mut self, target_ms: u32) -> Result<usize, FbsError> {
        let mut decoded = 0;
        while let Some(record) = self.read_record()? {
            if record.timestamp_ms > target_ms {
                self.pending = Some(record);
                break;
            }
            match self.apply(&record) {
                Ok(_) => {}
                Err(e) if !e.desynchronizes() => warn!("skipping damaged frame: {e}"),
                Err(e) => return Err(e),
            }
            decoded += 1;
        }
        Ok(decoded)
    }

    /// Timestamp of the last decoded record.
    pub fn position_ms(&self) -> u32 {
        self.position_ms
    }

    /// Position as a fraction of the duration.
    pub fn position_ratio(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        (f64::from(self.position_ms) / f64::from(self.duration_ms)).clamp(0.0, 1.0)
    }

    pub fn framebuffer(&self) -> &FrameBuffer {
        &self.framebuffer
    }

    pub fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    /// Drop the decoder state and hand back the source.
    pub fn close(self) -> R {
        debug!("closing session at {} ms", self.position_ms);
        self.records.into_inner()
    }

    // ── Internal ─────────────────────────────────────────────────

    fn read_record(&mut self) -> Result<Option<FrameRecord>, FbsError> {
        if self.desynchronized {
            return Err(FbsError::Desynchronized);
        }
        if let Some(record) = self.pending.take() {
            return Ok(Some(record));
        }
        self.records
            .next_record()
            .inspect_err(|e| self.mark_if_desynchronizing(e))
    }

    /// Decode one record into the framebuffer and advance the position.
    pub(crate) fn apply(&mut self, record: &FrameRecord) -> Result<FrameReport, FbsError> {
        self.position_ms = record.timestamp_ms;
        let result =
            self.decoder
                .decode_frame(record.offset, &record.payload, &mut self.framebuffer);
        match &result {
            Ok(report) => debug!(
                "record at {} ({} ms): {} rectangles, {} tiles",
                record.offset, record.timestamp_ms, report.rectangles, report.tiles
            ),
            Err(e) => self.mark_if_desynchronizing(e),
        }
        result
    }

    fn mark_if_desynchronizing(&mut self, err: &FbsError) {
        if err.desynchronizes() && !self.desynchronized {
            warn!("decoder desynchronized: {err}");
            self.desynchronized = true;
        }
    }

    fn frame(&self, report: FrameReport) -> Frame<'_> {
        Frame {
            rgb: self.framebuffer.as_bytes(),
            width: self.framebuffer.width(),
            height: self.framebuffer.height(),
            timestamp_ms: self.position_ms,
            report,
        }
    }
}

impl<R> std::fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("header", &self.header)
            .field("duration_ms", &self.duration_ms)
            .field("position_ms", &self.position_ms)
            .field("desynchronized", &self.desynchronized)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────
