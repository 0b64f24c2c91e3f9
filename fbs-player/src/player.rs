//! Headless playback loop.

use std::io::{Read, Seek};

use fbs_core::{FbsError, SeekError, Session};
use tracing::{debug, info, warn};

/// Totals for one playback run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    /// Records decoded, including damaged and skipped ones.
    pub frames: u64,
    /// Records whose decode failed without desynchronizing.
    pub damaged: u64,
    /// Non-update messages passed over.
    pub skipped_messages: u64,
    pub clipped_runs: u64,
    /// Timestamp of the last decoded record.
    pub position_ms: u32,
}

/// Seek to `target_ms`. Seeking past the end is not fatal: the
/// framebuffer then shows the final record.
pub fn seek<R: Read + Seek>(session: &mut Session<R>, target_ms: u32) -> Result<(), SeekError> {
    match session.seek(target_ms) {
        Ok(outcome) => {
            info!(
                "seeked to {} ms ({} records replayed)",
                outcome.reached_ms, outcome.frames_replayed
            );
            Ok(())
        }
        Err(SeekError::PastEnd { target_ms, last_ms }) => {
            warn!("{target_ms} ms is past the end; showing {last_ms} ms");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Decode up to `max_frames` records (0 = to the end).
///
/// Damaged frames are logged and counted; a desynchronizing error
/// stops playback.
pub fn play<R: Read + Seek>(
    session: &mut Session<R>,
    max_frames: u64,
) -> Result<PlaybackSummary, FbsError> {
    let mut summary = PlaybackSummary {
        position_ms: session.position_ms(),
        ..PlaybackSummary::default()
    };

    while max_frames == 0 || summary.frames < max_frames {
        match session.next_frame() {
            Ok(Some(frame)) => {
                summary.frames += 1;
                summary.clipped_runs += frame.report.clipped_runs as u64;
                if frame.report.is_skipped() {
                    summary.skipped_messages += 1;
                }
                debug!(
                    "{} ms: {} rectangles, {} tiles",
                    frame.timestamp_ms, frame.report.rectangles, frame.report.tiles
                );
            }
            Ok(None) => break,
            Err(e) if e.desynchronizes() => return Err(e),
            Err(e) => {
                warn!("damaged frame: {e}");
                summary.frames += 1;
                summary.damaged += 1;
            }
        }
        summary.position_ms = session.position_ms();
    }

    info!(
        "played {} records up to {} ms ({:.0}%)",
        summary.frames,
        summary.position_ms,
        session.position_ratio() * 100.0
    );
    Ok(summary)
}
