//! Media-domain types shared between the probe, the encoder and the
//! playlist generator.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Width and height of a video frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Metadata of a source file as reported by the probe.
///
/// Fetched once per session and read-only afterwards. Only `duration`,
/// `width` and `height` drive transcoding; the descriptive fields are for
/// display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Duration in seconds.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub title: Option<String>,
    /// Show name for episodes, artist for music.
    pub show_or_artist: Option<String>,
    pub description: Option<String>,
}

impl SourceMetadata {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Number of fixed-length segments covering the whole file
    /// (`ceil(duration / segment_seconds)`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Probe`] when the duration is not a positive finite
    /// number, and [`Error::Validation`] for a zero segment length.
    pub fn segment_count(&self, segment_seconds: u32) -> Result<u32> {
        if segment_seconds == 0 {
            return Err(Error::Validation("segment length must be positive".into()));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(Error::Probe(format!(
                "source duration is unusable: {}",
                self.duration
            )));
        }
        Ok((self.duration / f64::from(segment_seconds)).ceil() as u32)
    }
}
