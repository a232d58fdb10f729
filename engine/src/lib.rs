//! High-fidelity archival recording engine.
//!
//! Ingests one raw video track and at most one raw audio track from a live
//! capture source, encodes each on its own pipeline, and emits a single
//! muxed container (MP4 or WebM) with time-aligned tracks. The capture
//! source, the raw encoders, and the container muxers are external
//! collaborators consumed through the typed contracts in [`backend`] and
//! [`capture`]; everything else — codec negotiation, scaling, format
//! conversion, backpressure, timestamp normalization, orchestration, and
//! the final mux — lives here.

pub mod backend;
pub mod capture;
pub mod chunk;
pub mod conductor;
pub mod config;
pub mod convert;
pub mod error;
pub mod events;
pub mod frame;
pub mod logging;
pub mod mux;
pub mod negotiate;
pub mod pipeline;
pub mod recorder;
pub mod scale;

mod audio_pipeline;
mod video_pipeline;

pub use backend::MediaBackend;
pub use capture::{AudioTrack, AudioTrackSettings, CaptureHandle, VideoTrack, VideoTrackSettings};
pub use chunk::{EncodedChunk, TrackKind};
pub use config::{AudioConfig, RecorderConfig, Timeouts, VideoConfig};
pub use error::{ErrorKind, RecorderError, Result};
pub use events::{PressureLevel, RecorderEvent};
pub use frame::{RawAudioFrame, RawVideoFrame, ReleaseGuard};
pub use negotiate::{AudioCodec, Container, VideoCodec};
pub use recorder::{is_supported, EffectiveConfig, Recorder, RecordingResult};
