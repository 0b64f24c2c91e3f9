//! FBS container: signature, handshake and record framing.

pub mod header;
pub mod record;
pub mod writer;

pub use header::{ContainerHeader, MAGIC, ProtocolVersion, read_trailing_timestamp};
pub use record::{FrameRecord, RecordReader, padded_len};
pub use writer::RecordingWriter;
