//! M3U8 rendering.

use super::types::{MasterPlaylist, MediaPlaylist};
use std::fmt::Write;

/// Render a master playlist: `#EXTM3U` then one `#EXT-X-STREAM-INF` per
/// variant, in the given order.
pub fn generate_master_playlist(playlist: &MasterPlaylist) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "#EXTM3U");
    for variant in &playlist.variants {
        let _ = writeln!(
            out,
            "#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH={}",
            variant.bandwidth
        );
        let _ = writeln!(out, "{}", variant.uri);
    }

    out
}

/// Render a media playlist.
///
/// Complete playlists are marked `#EXT-X-PLAYLIST-TYPE:VOD` and terminated
/// with `#EXT-X-ENDLIST`.
pub fn generate_media_playlist(playlist: &MediaPlaylist) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "#EXTM3U");
    let _ = writeln!(out, "#EXT-X-VERSION:3");
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", playlist.target_duration);
    let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", playlist.media_sequence);
    if playlist.ended {
        let _ = writeln!(out, "#EXT-X-PLAYLIST-TYPE:VOD");
    }

    for segment in &playlist.segments {
        let _ = writeln!(out, "#EXTINF:{},", segment.duration);
        let _ = writeln!(out, "{}", segment.uri);
    }

    if playlist.ended {
        let _ = writeln!(out, "#EXT-X-ENDLIST");
    }

    out
}
