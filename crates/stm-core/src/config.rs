//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! server, library, transcode and tool settings. Every section defaults
//! sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::rates::{EncoderBaseline, RateLadder};
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub library: LibraryConfig,
    pub transcode: TranscodeConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.library.shares.is_empty() {
            warnings.push("library.shares is empty; nothing can be streamed".into());
        }
        for (i, share) in self.library.shares.iter().enumerate() {
            if !share.path.exists() {
                warnings.push(format!(
                    "library.shares[{i}].path {} does not exist",
                    share.path.display()
                ));
            }
        }

        if self.transcode.segment_seconds == 0 {
            warnings.push("transcode.segment_seconds is 0; playlists cannot be built".into());
        }

        if self.transcode.rates.is_empty() {
            warnings.push("transcode.rates is empty; master playlists will be empty".into());
        }

        let mut seen = HashSet::new();
        for profile in self.transcode.rates.profiles() {
            if !is_url_safe_name(&profile.name) {
                warnings.push(format!(
                    "rate name '{}' must be non-empty and use only [A-Za-z0-9_]",
                    profile.name
                ));
            }
            if !seen.insert(profile.name.as_str()) {
                warnings.push(format!("rate name '{}' is defined twice", profile.name));
            }
        }

        warnings
    }
}

fn is_url_safe_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9968,
        }
    }
}

/// A named media folder exposed to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareConfig {
    pub name: String,
    pub path: PathBuf,
}

/// Media library settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub shares: Vec<ShareConfig>,
    /// File extensions (without the dot) listed as playable.
    pub extensions: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            shares: Vec::new(),
            extensions: default_extensions(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    [
        "aif", "m2ts", "ts", "flac", "wmv", "ogm", "ogg", "wma", "m4a", "vob", "dif", "dv", "flv",
        "asf", "mp2", "mp3", "ac3", "aac", "mpeg4", "mp4", "m4v", "mpeg", "mkv", "mpg", "mov",
        "gvi", "avi",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl LibraryConfig {
    /// Whether a file name carries one of the playable extensions.
    pub fn is_media_file(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }
}

/// Segment transcoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Root under which each session gets its own segment directory.
    pub root_dir: PathBuf,
    /// Fixed length of every segment, in seconds.
    pub segment_seconds: u32,
    /// How many segments to keep encoded ahead of the latest request.
    pub readahead_segments: u32,
    pub rates: RateLadder,
    pub baseline: EncoderBaseline,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            root_dir: std::env::temp_dir().join("servetome"),
            segment_seconds: 5,
            readahead_segments: 5,
            rates: RateLadder::default(),
            baseline: EncoderBaseline::default(),
        }
    }
}

/// External tool path overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub probe_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            probe_timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::RateProfile;

    #[test]
    fn empty_json_is_valid() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.server.port, 9968);
        assert_eq!(config.transcode.segment_seconds, 5);
        assert_eq!(config.transcode.readahead_segments, 5);
        assert_eq!(config.transcode.rates.len(), 7);
        assert!(config.library.extensions.iter().any(|e| e == "mkv"));
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = Config::from_json(
            r#"{
                "server": { "port": 8000 },
                "library": { "shares": [{ "name": "Movies", "path": "/srv/movies" }] },
                "transcode": { "segment_seconds": 4 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.library.shares[0].name, "Movies");
        assert_eq!(config.transcode.segment_seconds, 4);
        assert_eq!(config.transcode.readahead_segments, 5);
        assert_eq!(config.transcode.baseline.sample_rate, 48_000);
    }

    #[test]
    fn parse_error_is_validation() {
        let err = Config::from_json("{ not json").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(Some(&dir.path().join("nope.json")));
        assert_eq!(config.server.port, 9968);
        assert_eq!(Config::load_or_default(None).server.port, 9968);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"transcode": {"readahead_segments": 2}}"#).unwrap();
        let config = Config::load_or_default(Some(&path));
        assert_eq!(config.transcode.readahead_segments, 2);
    }

    #[test]
    fn media_extension_filter() {
        let library = LibraryConfig::default();
        assert!(library.is_media_file("Show.S01E01.mkv"));
        assert!(library.is_media_file("clip.m4v"));
        assert!(!library.is_media_file("notes.txt"));
        assert!(!library.is_media_file("README"));
    }

    #[test]
    fn validate_flags_bad_rates() {
        let mut config = Config::default();
        config.library.shares.push(ShareConfig {
            name: "Movies".into(),
            path: std::env::temp_dir(),
        });
        assert!(config.validate().is_empty());

        let mut dup: RateProfile = config.transcode.rates.profiles()[0].clone();
        let mut bad = dup.clone();
        bad.name = "my/rate".into();
        dup.bandwidth = 1;
        let mut profiles = config.transcode.rates.profiles().to_vec();
        profiles.push(dup);
        profiles.push(bad);
        config.transcode.rates = RateLadder::new(profiles);
        config.transcode.segment_seconds = 0;

        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("defined twice")));
        assert!(warnings.iter().any(|w| w.contains("my/rate")));
        assert!(warnings.iter().any(|w| w.contains("segment_seconds")));
    }
}
