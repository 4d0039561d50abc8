//! HLS playlist types.

use serde::{Deserialize, Serialize};

/// A stream variant in a master playlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Peak bandwidth in bits per second.
    pub bandwidth: u64,
    /// URI of the media playlist for this variant.
    pub uri: String,
}

/// A single segment in a media playlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Segment duration in seconds.
    pub duration: u32,
    pub uri: String,
}

/// An HLS master playlist listing every variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterPlaylist {
    /// Variants in the order they should be offered to the client.
    pub variants: Vec<Variant>,
}

/// An HLS media playlist describing a sequence of segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPlaylist {
    /// Maximum segment duration in seconds.
    pub target_duration: u32,
    /// Sequence number of the first segment.
    pub media_sequence: u64,
    pub segments: Vec<Segment>,
    /// Whether the playlist is complete (VOD). If true, `#EXT-X-ENDLIST` is emitted.
    pub ended: bool,
}
