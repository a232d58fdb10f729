/// Error taxonomy for the recording engine.
///
/// Every error carries a machine-readable [`ErrorKind`] plus a human-readable
/// message. Kinds are what callers match on; messages are what ends up in
/// logs and event payloads.
use thiserror::Error;

/// The engine's crate-wide result type.
pub type Result<T> = std::result::Result<T, RecorderError>;

/// Machine-readable classification of a recorder failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The platform exposes no video encoder API at all.
    NotSupported,
    /// The capture source has no video track.
    NoVideoTrack,
    /// No (codec, container) candidate survived negotiation.
    NoCodec,
    /// An encoder failed after configuration, mid-session.
    EncoderFailed,
    /// The capture source reported unusable settings or failed to deliver.
    CaptureError,
    /// The container muxer rejected a chunk or failed to finalize.
    MuxFailed,
    /// A probe, start barrier, or stop barrier exceeded its deadline.
    Timeout,
    /// The requested audio codec cannot be carried by the chosen container.
    AudioIncompatible,
    /// An operation was called in a state that does not allow it.
    InvalidState,
}

impl ErrorKind {
    /// Stable lowercase name used in event payloads and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotSupported => "not_supported",
            ErrorKind::NoVideoTrack => "no_video_track",
            ErrorKind::NoCodec => "no_codec",
            ErrorKind::EncoderFailed => "encoder_failed",
            ErrorKind::CaptureError => "capture_error",
            ErrorKind::MuxFailed => "mux_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::AudioIncompatible => "audio_incompatible",
            ErrorKind::InvalidState => "invalid_state",
        }
    }
}

/// A recorder failure: a kind plus a message describing the specific cause.
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", .kind.as_str())]
pub struct RecorderError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RecorderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn not_supported() -> Self {
        Self::new(ErrorKind::NotSupported, "platform exposes no video encoder")
    }

    pub fn no_video_track() -> Self {
        Self::new(ErrorKind::NoVideoTrack, "capture source has no video track")
    }

    pub fn no_codec(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoCodec, message)
    }

    pub fn encoder_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EncoderFailed, message)
    }

    pub fn capture(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CaptureError, message)
    }

    pub fn mux_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MuxFailed, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn audio_incompatible(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AudioIncompatible, message)
    }

    /// `start` was called while a session is already running.
    pub fn already_running() -> Self {
        Self::new(ErrorKind::InvalidState, "recorder is already running")
    }

    /// `stop` was called with no session running.
    pub fn not_running() -> Self {
        Self::new(ErrorKind::InvalidState, "recorder is not running")
    }
}
