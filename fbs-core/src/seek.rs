//! Replay-based seeking.
//!
//! ZRLE frames only describe changes, and the zlib stream cannot be
//! entered mid-way, so a seek rewinds to the first update record and
//! decodes forward. The result is byte-identical to what sequential
//! playback shows at the same record.

use std::io::{Read, Seek};

use tracing::{debug, warn};

use crate::error::SeekError;
use crate::session::Session;

/// Where a seek landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekOutcome {
    /// Records decoded during the replay.
    pub frames_replayed: usize,
    /// Timestamp of the record the replay stopped on.
    pub reached_ms: u32,
}

impl<R: Read + Seek> Session<R> {
    /// Rewind and replay up to and including the first record stamped
    /// at or after `target_ms`.
    ///
    /// Clears a desynchronized state. If the recording ends first the
    /// framebuffer shows the final record and
    /// [`SeekError::PastEnd`] is returned.
    pub fn seek(&mut self, target_ms: u32) -> Result<SeekOutcome, SeekError> {
        debug!("seeking to {target_ms} ms");
        if let Err(e) = self.records.rewind_to(self.header.data_start) {
            self.desynchronized = true;
            return Err(e.into());
        }
        self.decoder.reset();
        self.framebuffer.clear();
        self.pending = None;
        self.position_ms = 0;
        self.desynchronized = false;

        let mut frames_replayed = 0;
        loop {
            let offset = self.records.offset();
            let record = match self.records.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(source) => {
                    self.desynchronized = true;
                    return Err(SeekError::Replay { offset, source });
                }
            };

            if let Err(source) = self.apply(&record) {
                if source.desynchronizes() {
                    return Err(SeekError::Replay { offset, source });
                }
                warn!("replay skipped damaged frame: {source}");
            }
            frames_replayed += 1;

            if record.timestamp_ms >= target_ms {
                return Ok(SeekOutcome {
                    frames_replayed,
                    reached_ms: record.timestamp_ms,
                });
            }
        }

        Err(SeekError::PastEnd {
            target_ms,
            last_ms: self.position_ms,
        })
    }

    /// Seek to a fraction of the duration, clamped to `0.0..=1.0`.
    pub fn seek_ratio(&mut self, ratio: f64) -> Result<SeekOutcome, SeekError> {
        let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        let target = (f64::from(self.duration_ms) * ratio).round() as u32;
        self.seek(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderConfig;
    use crate::container::{ProtocolVersion, RecordingWriter};
    use crate::pixel::{PixelFormat, rgb};
    use crate::zrle::{RectangleEncoder, update_message};
    use std::io::Cursor;

    /// Frames stamped 0, 40, 80, ... each adding a 2x2 block along the
    /// diagonal of a 16x16 screen.
    fn diagonal_recording(frames: u16) -> Vec<u8> {
        let format = PixelFormat::rgb888();
        let mut w =
            RecordingWriter::start(Vec::new(), ProtocolVersion::V3_8, 16, 16, &format, "").unwrap();
        let mut enc = RectangleEncoder::new(format);
        for i in 0..frames {
            let c = rgb(i as u8 * 30, 255, i as u8);
            let rect = enc.encode(i * 2, i * 2, 2, 2, &[c; 4]).unwrap();
            w.write_record(&update_message(&[rect]), u32::from(i) * 40).unwrap();
        }
        w.finish().unwrap()
    }

    fn open(data: Vec<u8>) -> Session<Cursor<Vec<u8>>> {
        Session::open(Cursor::new(data), DecoderConfig::default()).unwrap()
    }

    #[test]
    fn seek_matches_sequential_playback() {
        let data = diagonal_recording(8);

        let mut sequential = open(data.clone());
        let mut expected = Vec::new();
        while let Some(frame) = sequential.next_frame().unwrap() {
            expected.push((frame.timestamp_ms, frame.rgb.to_vec()));
        }

        let mut session = open(data);
        // Forward, backward, repeated.
        for target in [200u32, 40, 0, 280, 120, 120, 130] {
            let outcome = session.seek(target).unwrap();
            let (ts, image) = expected
                .iter()
                .find(|(ts, _)| *ts >= target)
                .unwrap();
            assert_eq!(outcome.reached_ms, *ts);
            assert_eq!(session.position_ms(), *ts);
            assert_eq!(session.framebuffer().as_bytes(), image.as_slice(), "target {target}");
        }
    }

    #[test]
    fn seek_then_continue_playing() {
        let mut session = open(diagonal_recording(4));
        let outcome = session.seek(40).unwrap();
        assert_eq!(outcome.frames_replayed, 2);

        let frame = session.next_frame().unwrap().unwrap();
        assert_eq!(frame.timestamp_ms, 80);
        assert_eq!(session.framebuffer().pixel(4, 4), Some([60, 255, 2]));
        assert_eq!(session.framebuffer().pixel(0, 0), Some([0, 255, 0]));
    }

    #[test]
    fn past_the_end() {
        let mut session = open(diagonal_recording(3));
        match session.seek(10_000) {
            Err(SeekError::PastEnd { target_ms, last_ms }) => {
                assert_eq!((target_ms, last_ms), (10_000, 80));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(session.framebuffer().pixel(4, 4), Some([60, 255, 2]));
    }

    #[test]
    fn ratio_maps_onto_duration() {
        let mut session = open(diagonal_recording(6));
        assert_eq!(session.info().duration_ms, 200);
        assert_eq!(session.seek_ratio(0.5).unwrap().reached_ms, 120);
        assert_eq!(session.seek_ratio(2.0).unwrap().reached_ms, 200);
        assert_eq!(session.seek_ratio(-1.0).unwrap().reached_ms, 0);
        assert!((session.position_ratio() - 0.0).abs() < f64::EPSILON);
    }
}
