/// Read-only handle onto a live capture source.
///
/// Each track is a lazy, finite sequence of owned frames: the capture side
/// holds the sender of a bounded channel and moves every frame it produces
/// into it, the consuming pipeline receives and thereby owns them. The
/// sequence ends when the capture side drops its sender. There is no rewind;
/// restarting capture means constructing a new handle.
use tokio::sync::mpsc;

use crate::config::{MAX_FRAME_RATE, MIN_FRAME_RATE};
use crate::error::{RecorderError, Result};
use crate::frame::{RawAudioFrame, RawVideoFrame};

/// Channel capacity for raw video frames (large buffers, keep few in flight).
pub const VIDEO_CHANNEL_CAPACITY: usize = 8;
/// Channel capacity for raw audio frames (small buffers, arrive in bursts).
pub const AUDIO_CHANNEL_CAPACITY: usize = 32;

/// Actual video settings reported by the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTrackSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl VideoTrackSettings {
    /// Rejects settings the engine cannot record from.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RecorderError::capture(format!(
                "video track reports {}x{}",
                self.width, self.height
            )));
        }
        if !(MIN_FRAME_RATE..=MAX_FRAME_RATE).contains(&self.frame_rate) {
            return Err(RecorderError::capture(format!(
                "video track reports {} fps",
                self.frame_rate
            )));
        }
        Ok(())
    }
}

/// Actual audio settings reported by the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTrackSettings {
    pub sample_rate: u32,
    pub channel_count: u16,
}

/// The video side of a capture source.
pub struct VideoTrack {
    pub settings: VideoTrackSettings,
    pub frames: mpsc::Receiver<RawVideoFrame>,
}

impl VideoTrack {
    /// Creates a track and the sender the capture side feeds it through.
    pub fn channel(settings: VideoTrackSettings) -> (mpsc::Sender<RawVideoFrame>, Self) {
        let (tx, rx) = mpsc::channel(VIDEO_CHANNEL_CAPACITY);
        (tx, Self { settings, frames: rx })
    }
}

/// The audio side of a capture source.
pub struct AudioTrack {
    pub settings: AudioTrackSettings,
    pub frames: mpsc::Receiver<RawAudioFrame>,
}

impl AudioTrack {
    pub fn channel(settings: AudioTrackSettings) -> (mpsc::Sender<RawAudioFrame>, Self) {
        let (tx, rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        (tx, Self { settings, frames: rx })
    }
}

/// One raw video track (required) and at most one raw audio track.
pub struct CaptureHandle {
    pub video: Option<VideoTrack>,
    pub audio: Option<AudioTrack>,
}

impl CaptureHandle {
    pub fn new(video: VideoTrack, audio: Option<AudioTrack>) -> Self {
        Self { video: Some(video), audio }
    }

    pub fn video_only(video: VideoTrack) -> Self {
        Self { video: Some(video), audio: None }
    }
}
