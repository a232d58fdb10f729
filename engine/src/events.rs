use crate::error::ErrorKind;

/// Backpressure level derived from the video encoder's pending-queue depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureLevel {
    High,
    Low,
}

/// Notifications emitted by a recording session over the recorder's event
/// channel. Consumers that never drain the channel lose nothing but the
/// notifications; the session itself does not depend on them being read.
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// All active pipelines reported ready and frames are flowing.
    Started,
    /// The session finished and produced a container of `bytes` length.
    Stopped { bytes: usize },
    /// A fatal error occurred in a pipeline or during finalization.
    Error { kind: ErrorKind, message: String },
    /// The video pipeline crossed a backpressure watermark.
    Pressure { level: PressureLevel, queue_depth: usize },
    /// High pressure has persisted for `for_secs` seconds. Informational.
    SustainedPressure { for_secs: u64, queue_depth: usize },
    /// A recoverable condition, e.g. audio disabled for the session.
    Warning { message: String },
}
