/// Typed contracts for the engine's external collaborators: the platform
/// codec registry, the raw encoders, and the container muxers. These are
/// consumed as black boxes; their failures surface as `anyhow` errors which
/// the engine maps to its own taxonomy at the call site.
///
/// Capability probes may block — or hang outright on some platforms — so the
/// negotiator always bounds them with a timeout on a blocking thread.
use anyhow::Result;

use crate::chunk::EncodedChunk;
use crate::config::HwPreference;
use crate::frame::{RawAudioFrame, RawVideoFrame};
use crate::negotiate::{AudioCodec, AudioPlan, Container, VideoCodec, VideoPlan};

/// Capability probe for one (video codec, profile) candidate.
#[derive(Debug, Clone)]
pub struct VideoProbe {
    pub codec: VideoCodec,
    /// Codec string of the candidate, e.g. `avc1.640028`.
    pub profile: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub bitrate: u32,
    pub hw_pref: HwPreference,
}

/// Capability probe for one audio configuration candidate.
#[derive(Debug, Clone)]
pub struct AudioProbe {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
}

/// Result of a capability probe.
#[derive(Debug, Clone, Copy)]
pub struct ProbeOutcome {
    pub supported: bool,
    /// True when the platform would service this configuration in hardware.
    pub hardware: bool,
}

impl ProbeOutcome {
    pub fn unsupported() -> Self {
        Self { supported: false, hardware: false }
    }
}

/// Sink for encoder output. Called from whatever thread the encoder drains
/// its queue on; implementations must not block.
pub type ChunkCallback = Box<dyn FnMut(EncodedChunk) + Send>;

/// A raw video encoder. `submit` borrows the frame; the pipeline keeps
/// ownership and releases it after the call returns.
pub trait VideoEncoder: Send {
    fn configure(&mut self, plan: &VideoPlan, output: ChunkCallback) -> Result<()>;
    fn submit(&mut self, frame: &RawVideoFrame, force_keyframe: bool) -> Result<()>;
    /// Drains all pending input; every remaining chunk is delivered to the
    /// output callback before this returns.
    fn flush(&mut self) -> Result<()>;
    fn close(&mut self);
    /// Number of submitted frames not yet returned as chunks.
    fn queue_depth(&self) -> usize;
}

/// A raw audio encoder, same surface minus keyframe control (audio sync
/// points are encoder-internal).
pub trait AudioEncoder: Send {
    fn configure(&mut self, plan: &AudioPlan, output: ChunkCallback) -> Result<()>;
    fn submit(&mut self, frame: &RawAudioFrame) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn close(&mut self);
    fn queue_depth(&self) -> usize;
}

/// Declared parameters of the video track handed to the muxer.
#[derive(Debug, Clone)]
pub struct VideoTrackMeta {
    pub codec: VideoCodec,
    pub profile: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

/// Declared parameters of the audio track handed to the muxer.
#[derive(Debug, Clone)]
pub struct AudioTrackMeta {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Muxer instantiation parameters.
#[derive(Debug, Clone)]
pub struct MuxerInit {
    pub container: Container,
    /// MP4 output is fragmented; WebM streams natively.
    pub fragmented: bool,
    /// Rebase the first timestamp of each track to zero.
    pub zero_base_timestamps: bool,
    pub video: VideoTrackMeta,
    pub audio: Option<AudioTrackMeta>,
}

/// A container muxer accepting encoded chunks in timestamp order.
pub trait ContainerMuxer: Send {
    fn add_video_chunk(&mut self, chunk: &EncodedChunk) -> Result<()>;
    fn add_audio_chunk(&mut self, chunk: &EncodedChunk) -> Result<()>;
    /// Signals end-of-stream and returns the finished container bytes.
    fn finalize(self: Box<Self>) -> Result<Vec<u8>>;
}

/// The platform's media capabilities, injected into the recorder.
pub trait MediaBackend: Send + Sync {
    /// True when the platform exposes a video encoder API at all.
    fn supports_video(&self) -> bool;
    /// True when the platform exposes an audio encoder API.
    fn supports_audio(&self) -> bool;
    /// May block or hang; call through a timeout.
    fn probe_video(&self, probe: &VideoProbe) -> ProbeOutcome;
    /// May block or hang; call through a timeout.
    fn probe_audio(&self, probe: &AudioProbe) -> ProbeOutcome;
    fn create_video_encoder(&self) -> Box<dyn VideoEncoder>;
    fn create_audio_encoder(&self) -> Box<dyn AudioEncoder>;
    fn create_muxer(&self, init: &MuxerInit) -> Result<Box<dyn ContainerMuxer>>;
}
