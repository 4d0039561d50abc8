//! Master and per-rate playlists of a session.
//!
//! Both are pure functions of the rate ladder and the cached source
//! metadata; building a playlist never starts an encode. URLs are
//! root-relative and point back at the session routes:
//! `/session/<key>/<rate>.m3u8` and `/session/<key>/<rate>-<index>.ts`.

use stm_core::{RateLadder, Result, SourceMetadata};

use crate::hls::{
    generate_master_playlist, generate_media_playlist, MasterPlaylist, MediaPlaylist, Segment,
    Variant,
};
use crate::segment::segment_file_name;

fn session_url(key: &str, file: &str) -> String {
    format!("/session/{}/{file}", urlencoding::encode(key))
}

/// One variant per rate, highest bandwidth first.
pub fn master_playlist(key: &str, ladder: &RateLadder) -> String {
    let variants = ladder
        .by_descending_bandwidth()
        .into_iter()
        .map(|profile| Variant {
            bandwidth: profile.bandwidth,
            uri: session_url(key, &format!("{}.m3u8", profile.name)),
        })
        .collect();

    generate_master_playlist(&MasterPlaylist { variants })
}

/// Every segment of `rate`, each advertised at the full segment length.
///
/// # Errors
///
/// Fails when the metadata has no usable duration (see
/// [`SourceMetadata::segment_count`]).
pub fn rate_playlist(
    key: &str,
    rate: &str,
    metadata: &SourceMetadata,
    segment_seconds: u32,
) -> Result<String> {
    let count = metadata.segment_count(segment_seconds)?;
    let segments = (0..count)
        .map(|index| Segment {
            duration: segment_seconds,
            uri: session_url(key, &segment_file_name(rate, index)),
        })
        .collect();

    Ok(generate_media_playlist(&MediaPlaylist {
        target_duration: segment_seconds,
        media_sequence: 0,
        segments,
        ended: true,
    }))
}
