//! HLS playlist generation.
//!
//! Plain data types for master and media playlists plus the functions that
//! render them as M3U8 text.

mod generator;
mod types;

pub use generator::{generate_master_playlist, generate_media_playlist};
pub use types::{MasterPlaylist, MediaPlaylist, Segment, Variant};
