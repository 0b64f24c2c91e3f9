//! ZRLE: zlib-compressed, run-length and palette encoded tiles.

pub mod decoder;
pub mod encoder;
pub mod tile;

pub use decoder::{FRAMEBUFFER_UPDATE, FrameDecoder, FrameReport};
pub use encoder::{ENCODING_ZRLE, RectangleEncoder, SyncDeflater, TileEncoder, update_message};
pub use tile::{Subencoding, TILE_SIZE, Tile, TileDecoder};
