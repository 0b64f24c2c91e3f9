//! # fbs-player: FBS recording player
//!
//! Opens a recording with `fbs-core`, plays or seeks it headlessly and
//! dumps the resulting framebuffer as a PPM image.

pub mod config;
pub mod dump;
pub mod player;
