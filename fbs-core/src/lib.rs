//! # fbs-core
//!
//! Decoder for FBS screen recordings: RFB (VNC) sessions captured as
//! timestamped server messages with ZRLE-encoded framebuffer updates.
//!
//! This crate contains:
//! - **Container**: `ContainerHeader`, `RecordReader`, `RecordingWriter` for
//!   the signature, handshake and record framing
//! - **Inflate**: `StreamingDecompressor`, the zlib context kept alive for
//!   the whole session
//! - **ZRLE**: `TileDecoder` and `FrameDecoder` for update messages, plus
//!   the matching encoders used to synthesise recordings
//! - **Framebuffer**: `FrameBuffer`, the persistent RGB8 image
//! - **Session**: `Session` with sequential playback and replay-based seek
//! - **Error**: `FbsError`, `SeekError`: typed, `thiserror`-based errors

pub mod be;
pub mod config;
pub mod container;
pub mod error;
pub mod framebuffer;
pub mod inflate;
pub mod pixel;
pub mod seek;
pub mod session;
pub mod zrle;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use config::{DecoderConfig, OverrunPolicy};
pub use container::{ContainerHeader, FrameRecord, ProtocolVersion, RecordReader, RecordingWriter};
pub use error::{FbsError, SeekError};
pub use framebuffer::FrameBuffer;
pub use inflate::StreamingDecompressor;
pub use pixel::{PixelFormat, Rgb24};
pub use seek::SeekOutcome;
pub use session::{Frame, Session, StreamInfo};
pub use zrle::{FrameDecoder, FrameReport, RectangleEncoder, TileDecoder, update_message};
