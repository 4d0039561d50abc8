//! The adaptive-bitrate rate ladder.
//!
//! A [`RateLadder`] is a fixed, ordered set of [`RateProfile`]s defined at
//! startup. Each profile carries its advertised bandwidth, encoder quality
//! knobs and the largest frame it may produce. [`fit_resolution`] decides
//! whether a source must be scaled down for a given profile.

use serde::{Deserialize, Serialize};

use crate::media::Resolution;

/// One rung of the ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateProfile {
    /// URL-safe name used in playlist and segment file names.
    pub name: String,
    /// Advertised `BANDWIDTH` in bits per second.
    pub bandwidth: u64,
    /// Video `-maxrate` in bits per second.
    pub video_max_bitrate: u64,
    /// Audio `-b:a` in bits per second.
    pub audio_bitrate: u64,
    pub audio_channels: u32,
    /// Quantizer curve compression (`-qcomp`), kept as text so `0` and
    /// `0.35` render exactly as configured.
    pub qcomp: String,
    /// Subpixel refinement (`-subq`).
    pub subq: u32,
    /// Reference frames (`-refs`).
    pub refs: u32,
    pub crf: u32,
    /// Motion-search method (`-me_method`): `dia`, `hex`, `umh`.
    pub me_method: String,
    pub max_width: u32,
    pub max_height: u32,
}

impl RateProfile {
    pub fn max_resolution(&self) -> Resolution {
        Resolution::new(self.max_width, self.max_height)
    }

    /// Encoder arguments specific to this rung.
    pub fn encoder_args(&self) -> Vec<String> {
        vec![
            "-maxrate".into(),
            self.video_max_bitrate.to_string(),
            "-b:a".into(),
            self.audio_bitrate.to_string(),
            "-ac".into(),
            self.audio_channels.to_string(),
            "-qcomp".into(),
            self.qcomp.clone(),
            "-subq".into(),
            self.subq.to_string(),
            "-refs".into(),
            self.refs.to_string(),
            "-crf".into(),
            self.crf.to_string(),
            "-me_method".into(),
            self.me_method.clone(),
        ]
    }
}

/// Encoder parameters shared by every rung of the ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderBaseline {
    pub container: String,
    pub audio_codec: String,
    pub video_codec: String,
    pub sample_rate: u32,
    pub video_profile: String,
    pub level: u32,
    pub me_range: u32,
    pub sc_threshold: u32,
    pub qmin: u32,
    pub qmax: u32,
    pub qdiff: u32,
    pub flags: String,
    pub partitions: String,
    pub bufsize: u64,
    pub minrate: u64,
}

impl Default for EncoderBaseline {
    fn default() -> Self {
        Self {
            container: "mpegts".into(),
            audio_codec: "libmp3lame".into(),
            video_codec: "h264".into(),
            sample_rate: 48_000,
            video_profile: "baseline".into(),
            level: 30,
            me_range: 16,
            sc_threshold: 0,
            qmin: 15,
            qmax: 51,
            qdiff: 4,
            flags: "+loop".into(),
            partitions: "+parti8x8+parti4x4+partp8x8+partb8x8".into(),
            bufsize: 2048 * 1024,
            minrate: 0,
        }
    }
}

impl EncoderBaseline {
    /// Conformance arguments appended after the profile's own knobs.
    pub fn encoder_args(&self) -> Vec<String> {
        vec![
            "-ar".into(),
            self.sample_rate.to_string(),
            "-vprofile".into(),
            self.video_profile.clone(),
            "-level".into(),
            self.level.to_string(),
            "-me_range".into(),
            self.me_range.to_string(),
            "-sc_threshold".into(),
            self.sc_threshold.to_string(),
            "-qmin".into(),
            self.qmin.to_string(),
            "-qmax".into(),
            self.qmax.to_string(),
            "-qdiff".into(),
            self.qdiff.to_string(),
            "-flags".into(),
            self.flags.clone(),
            "-partitions".into(),
            self.partitions.clone(),
            "-bufsize".into(),
            self.bufsize.to_string(),
            "-minrate".into(),
            self.minrate.to_string(),
        ]
    }
}

/// The ordered set of rate profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateLadder {
    profiles: Vec<RateProfile>,
}

impl RateLadder {
    pub fn new(profiles: Vec<RateProfile>) -> Self {
        Self { profiles }
    }

    pub fn get(&self, name: &str) -> Option<&RateProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Profiles sorted from the highest to the lowest bandwidth.
    pub fn by_descending_bandwidth(&self) -> Vec<&RateProfile> {
        let mut sorted: Vec<&RateProfile> = self.profiles.iter().collect();
        sorted.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));
        sorted
    }

    pub fn profiles(&self) -> &[RateProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[allow(clippy::too_many_arguments)]
fn rung(
    name: &str,
    bandwidth: u64,
    video_max_bitrate: u64,
    audio_bitrate: u64,
    audio_channels: u32,
    qcomp: &str,
    subq: u32,
    refs: u32,
    crf: u32,
    me_method: &str,
    max_width: u32,
    max_height: u32,
) -> RateProfile {
    RateProfile {
        name: name.into(),
        bandwidth,
        video_max_bitrate,
        audio_bitrate,
        audio_channels,
        qcomp: qcomp.into(),
        subq,
        refs,
        crf,
        me_method: me_method.into(),
        max_width,
        max_height,
    }
}

impl Default for RateLadder {
    fn default() -> Self {
        Self::new(vec![
            rung("veryhigh", 2_048_000, 2304 * 1024, 192 * 1024, 2, "0.35", 1, 1, 24, "hex", 1280, 720),
            rung("high", 1_440_000, 1440 * 1024, 192 * 1024, 2, "0.35", 4, 1, 24, "hex", 640, 480),
            rung("midhigh", 720_000, 720 * 1024, 128 * 1024, 2, "0.25", 4, 1, 24, "dia", 480, 320),
            rung("mid", 360_000, 288 * 1024, 96 * 1024, 2, "0.15", 4, 2, 25, "dia", 360, 240),
            rung("midlow", 144_000, 84 * 1024, 48 * 1024, 1, "0.15", 8, 4, 23, "umh", 240, 160),
            rung("low", 96_000, 72 * 1024, 32 * 1024, 1, "0.15", 8, 6, 25, "umh", 192, 128),
            rung("verylow", 64_000, 48 * 1024, 16 * 1024, 1, "0", 8, 6, 23, "umh", 192, 128),
        ])
    }
}

/// Compute the output frame size for `source` under `profile`.
///
/// Returns `None` when the source already fits inside the profile's box (no
/// scaling filter needed). Otherwise the aspect ratio is preserved by
/// clamping the dimension that overflows relatively more, and both sides are
/// rounded down to an even number of at least 2.
pub fn fit_resolution(source: Resolution, profile: &RateProfile) -> Option<Resolution> {
    let max = profile.max_resolution();
    if source.width == 0 || source.height == 0 {
        return None;
    }
    if source.width <= max.width && source.height <= max.height {
        return None;
    }

    let source_aspect = f64::from(source.width) / f64::from(source.height);
    let max_aspect = f64::from(max.width) / f64::from(max.height);

    let (width, height) = if source_aspect > max_aspect {
        let w = source.width.min(max.width);
        (w, (f64::from(w) / source_aspect) as u32)
    } else {
        let h = source.height.min(max.height);
        ((f64::from(h) * source_aspect) as u32, h)
    };

    Some(Resolution::new((width & !1).max(2), (height & !1).max(2)))
}
