//! Source metadata probing.
//!
//! [`MetadataProbe`] is the seam between sessions and whatever reports a
//! file's duration and frame size. [`FfprobeProbe`] shells out to
//! `ffprobe -v quiet -print_format json -show_format -show_streams` and maps
//! the JSON output into [`SourceMetadata`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use stm_core::SourceMetadata;

use crate::command::ToolCommand;

/// Something that can report the metadata of a media file.
///
/// Implementations must be safe to share across threads (`Send + Sync`).
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    /// Probe the file at `path`.
    ///
    /// Fails with [`stm_core::Error::Probe`] if the file is unreadable or
    /// cannot be decoded.
    async fn probe(&self, path: &Path) -> stm_core::Result<SourceMetadata>;
}

/// A probe backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeProbe {
    /// Create a new probe using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self {
            ffprobe_path,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MetadataProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> stm_core::Result<SourceMetadata> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args([
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());
        cmd.timeout(self.timeout);

        let output = cmd.execute().await.map_err(|e| {
            stm_core::Error::Probe(format!("{}: {e}", path.display()))
        })?;

        let metadata = parse_ffprobe_json(&output.stdout_text())?;
        tracing::debug!(
            file = %path.display(),
            duration = metadata.duration,
            width = metadata.width,
            height = metadata.height,
            title = ?metadata.title,
            "Probed source metadata"
        );
        Ok(metadata)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Container tags. ffprobe preserves the container's casing, so both
/// spellings are accepted.
#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    #[serde(alias = "TITLE")]
    title: Option<String>,
    #[serde(alias = "SHOW")]
    show: Option<String>,
    #[serde(alias = "ARTIST")]
    artist: Option<String>,
    #[serde(alias = "DESCRIPTION")]
    description: Option<String>,
    #[serde(alias = "COMMENT")]
    comment: Option<String>,
}

/// Map ffprobe's JSON document into [`SourceMetadata`].
pub fn parse_ffprobe_json(json: &str) -> stm_core::Result<SourceMetadata> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| stm_core::Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let duration = output
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| stm_core::Error::Probe("ffprobe reported no duration".into()))?;

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let tags = output.format.tags;
    Ok(SourceMetadata {
        duration,
        width: video.and_then(|v| v.width).unwrap_or(0),
        height: video.and_then(|v| v.height).unwrap_or(0),
        title: tags.title,
        show_or_artist: tags.show.or(tags.artist),
        description: tags.description.or(tags.comment),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPISODE: &str = r#"{
        "streams": [
            { "index": 0, "codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720 },
            { "index": 1, "codec_type": "audio", "codec_name": "ac3", "channels": 6 }
        ],
        "format": {
            "format_name": "matroska,webm",
            "duration": "2725.034667",
            "tags": {
                "title": "When She Was Bad",
                "show": "Buffy The Vampire Slayer",
                "artist": "ignored when show is present",
                "comment": "Season 2 premiere"
            }
        }
    }"#;

    #[test]
    fn parses_episode_metadata() {
        let meta = parse_ffprobe_json(EPISODE).unwrap();
        assert!((meta.duration - 2725.034667).abs() < 1e-9);
        assert_eq!(meta.width, 1280);
        assert_eq!(meta.height, 720);
        assert_eq!(meta.title.as_deref(), Some("When She Was Bad"));
        assert_eq!(meta.show_or_artist.as_deref(), Some("Buffy The Vampire Slayer"));
        assert_eq!(meta.description.as_deref(), Some("Season 2 premiere"));
    }

    #[test]
    fn audio_only_has_zero_frame() {
        let json = r#"{
            "streams": [{ "codec_type": "audio" }],
            "format": { "duration": "180.5", "tags": { "ARTIST": "Someone" } }
        }"#;
        let meta = parse_ffprobe_json(json).unwrap();
        assert_eq!((meta.width, meta.height), (0, 0));
        assert_eq!(meta.show_or_artist.as_deref(), Some("Someone"));
        assert!(meta.title.is_none());
    }

    #[test]
    fn missing_duration_is_probe_error() {
        let json = r#"{ "streams": [], "format": { "format_name": "mpegts" } }"#;
        let err = parse_ffprobe_json(json).unwrap_err();
        assert!(matches!(err, stm_core::Error::Probe(_)));
    }

    #[test]
    fn garbage_is_probe_error() {
        let err = parse_ffprobe_json("").unwrap_err();
        assert!(err.to_string().contains("parse error"));
    }

    #[tokio::test]
    async fn missing_binary_is_probe_error() {
        let probe = FfprobeProbe::new(PathBuf::from("/nonexistent/ffprobe"));
        let err = probe.probe(Path::new("/tmp/whatever.mkv")).await.unwrap_err();
        assert!(matches!(err, stm_core::Error::Probe(_)));
    }
}
