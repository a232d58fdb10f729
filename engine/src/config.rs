/// Session configuration: validated and clamped at construction, immutable
/// after `start`. Deserializable from TOML so a host application can keep a
/// recorder profile on disk; a missing file yields the defaults.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MIN_FRAME_RATE: u32 = 1;
pub const MAX_FRAME_RATE: u32 = 120;

pub const MIN_VIDEO_BITRATE: u32 = 250_000;
pub const MAX_VIDEO_BITRATE: u32 = 100_000_000;
pub const DEFAULT_VIDEO_BITRATE: u32 = 8_000_000;

pub const MIN_AUDIO_BITRATE: u32 = 8_000;
pub const MAX_AUDIO_BITRATE: u32 = 512_000;
pub const DEFAULT_AUDIO_BITRATE: u32 = 128_000;

/// Sample rates the negotiator will hold fixed across fallbacks.
pub const SUPPORTED_SAMPLE_RATES: [u32; 4] = [16_000, 32_000, 44_100, 48_000];

pub const DEFAULT_KEYFRAME_INTERVAL_S: f64 = 2.0;

/// Restricts the video negotiation set; `auto` walks the full fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodecPreference {
    #[default]
    Auto,
    Av1,
    Hevc,
    H264,
    Vp9,
}

/// Drives the frame scaler; `auto` snaps to the nearest standard rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResolutionTarget {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "4k")]
    Uhd4k,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "540p")]
    P540,
}

/// Hardware-encoder preference passed through to capability probes and
/// recorded in the effective config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HwPreference {
    #[default]
    Auto,
    PreferHw,
    PreferSw,
}

/// Audio codec request, mapped to container constraints during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodecPreference {
    #[default]
    Auto,
    Opus,
    Aac,
    Mp3,
    Flac,
}

/// Video side of a session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Expected capture width; overridden by the actual track settings.
    #[serde(default = "default_width")]
    pub width: u32,
    /// Expected capture height; overridden by the actual track settings.
    #[serde(default = "default_height")]
    pub height: u32,
    /// Frames per second, clamped to [1, 120].
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// Encode bitrate in bits/s, clamped to [250k, 100M].
    #[serde(default = "default_video_bitrate")]
    pub bitrate: u32,
    #[serde(default)]
    pub codec_preference: VideoCodecPreference,
    /// Seconds between forced keyframes; 0 leaves keyframing to the encoder.
    #[serde(default = "default_keyframe_interval")]
    pub keyframe_interval_s: f64,
    #[serde(default)]
    pub hw_pref: HwPreference,
    #[serde(default)]
    pub resolution_target: ResolutionTarget,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            frame_rate: default_frame_rate(),
            bitrate: default_video_bitrate(),
            codec_preference: VideoCodecPreference::default(),
            keyframe_interval_s: default_keyframe_interval(),
            hw_pref: HwPreference::default(),
            resolution_target: ResolutionTarget::default(),
        }
    }
}

impl VideoConfig {
    /// Keyframe cadence in frames at the given capture frame rate.
    pub fn keyframe_interval_frames(&self, frame_rate: u32) -> u32 {
        (self.keyframe_interval_s * frame_rate as f64).round() as u32
    }
}

/// Audio side of a session configuration. Absent = video-only recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub codec_preference: AudioCodecPreference,
    /// One of 16000, 32000, 44100, 48000; other values snap to the nearest.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// 1 or 2.
    #[serde(default = "default_channels")]
    pub channels: u16,
    /// Bits/s; values outside [8k, 512k] reset to 128k.
    #[serde(default = "default_audio_bitrate")]
    pub bitrate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            codec_preference: AudioCodecPreference::default(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            bitrate: default_audio_bitrate(),
        }
    }
}

/// Deadlines for the session's three synchronization points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Per capability probe.
    #[serde(default = "default_probe_ms")]
    pub probe_ms: u64,
    /// Start readiness barrier across all active pipelines.
    #[serde(default = "default_start_ms")]
    pub start_ms: u64,
    /// Stop completion barrier across all active pipelines.
    #[serde(default = "default_stop_ms")]
    pub stop_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe_ms: default_probe_ms(),
            start_ms: default_start_ms(),
            stop_ms: default_stop_ms(),
        }
    }
}

/// Root recorder configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecorderConfig {
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub audio: Option<AudioConfig>,
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl RecorderConfig {
    /// Returns a clamped copy. Applying this twice yields the same values.
    pub fn validated(&self) -> RecorderConfig {
        let mut cfg = self.clone();

        cfg.video.frame_rate = cfg.video.frame_rate.clamp(MIN_FRAME_RATE, MAX_FRAME_RATE);
        cfg.video.bitrate = cfg.video.bitrate.clamp(MIN_VIDEO_BITRATE, MAX_VIDEO_BITRATE);
        if !cfg.video.keyframe_interval_s.is_finite() || cfg.video.keyframe_interval_s < 0.0 {
            cfg.video.keyframe_interval_s = DEFAULT_KEYFRAME_INTERVAL_S;
        }

        if let Some(audio) = cfg.audio.as_mut() {
            if !(MIN_AUDIO_BITRATE..=MAX_AUDIO_BITRATE).contains(&audio.bitrate) {
                audio.bitrate = DEFAULT_AUDIO_BITRATE;
            }
            audio.sample_rate = nearest_sample_rate(audio.sample_rate);
            audio.channels = audio.channels.clamp(1, 2);
        }

        cfg
    }
}

/// Snaps an arbitrary rate to the nearest supported sample rate.
pub fn nearest_sample_rate(rate: u32) -> u32 {
    *SUPPORTED_SAMPLE_RATES
        .iter()
        .min_by_key(|&&supported| supported.abs_diff(rate))
        .expect("sample rate table is non-empty")
}

/// Loads the config file at `path`, returning `RecorderConfig::default()` if
/// the file does not exist. Errors if the file exists but cannot be parsed.
pub fn load_or_default(path: &Path) -> Result<RecorderConfig> {
    if !path.exists() {
        return Ok(RecorderConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_frame_rate() -> u32 {
    30
}

fn default_video_bitrate() -> u32 {
    DEFAULT_VIDEO_BITRATE
}

fn default_keyframe_interval() -> f64 {
    DEFAULT_KEYFRAME_INTERVAL_S
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_channels() -> u16 {
    2
}

fn default_audio_bitrate() -> u32 {
    DEFAULT_AUDIO_BITRATE
}

fn default_probe_ms() -> u64 {
    2_000
}

fn default_start_ms() -> u64 {
    15_000
}

fn default_stop_ms() -> u64 {
    20_000
}
