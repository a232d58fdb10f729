/// Machinery shared by the two encoding pipelines: the per-pipeline state
/// machine, the dropped-frame keyframe gate, and the video backpressure
/// gate. Each worker owns one instance of each; nothing here is shared
/// across threads except through the state watch channel.
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::chunk::TrackKind;
use crate::error::{ErrorKind, RecorderError};
use crate::events::PressureLevel;

/// Video encoder queue thresholds.
pub const VIDEO_HIGH_WATER: usize = 8;
pub const VIDEO_LOW_WATER: usize = 3;
pub const VIDEO_CRITICAL_WATER: usize = 15;

/// Minimum spacing between throttle state changes. Crossing the critical
/// watermark overrides it.
pub const PRESSURE_COOLDOWN: Duration = Duration::from_millis(500);

/// Audio encoder queue thresholds: above `AUDIO_HIGH_WATER` the worker
/// sleeps in `AUDIO_DRAIN_SLEEP` steps until the queue is back at or below
/// `AUDIO_RESUME_WATER`.
pub const AUDIO_HIGH_WATER: usize = 30;
pub const AUDIO_RESUME_WATER: usize = 15;
pub const AUDIO_DRAIN_SLEEP: Duration = Duration::from_millis(50);

/// Lifecycle of one pipeline within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Negotiating,
    Ready,
    Running,
    Draining,
    Stopped,
    Failed(ErrorKind),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Stopped | PipelineState::Failed(_))
    }

    /// Legal forward transitions. Any non-terminal state may fail.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        if let Failed(_) = next {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Idle, Negotiating)
                | (Negotiating, Ready)
                | (Ready, Running)
                | (Running, Draining)
                | (Draining, Stopped)
        )
    }
}

/// Observable holder of a pipeline's state. The worker advances it; the
/// conductor (and tests) watch it.
pub struct StateCell {
    tx: watch::Sender<PipelineState>,
}

impl StateCell {
    pub fn new() -> (Self, watch::Receiver<PipelineState>) {
        let (tx, rx) = watch::channel(PipelineState::Idle);
        (Self { tx }, rx)
    }

    pub fn get(&self) -> PipelineState {
        *self.tx.borrow()
    }

    /// Advances the state. Illegal transitions are a programming error.
    pub fn set(&self, next: PipelineState) {
        let current = self.get();
        debug_assert!(
            current.can_transition_to(next),
            "illegal pipeline transition {current:?} -> {next:?}"
        );
        let _ = self.tx.send(next);
    }
}

/// Dropped-frame keyframe rule: any drop arms the gate; the first
/// subsequent submission is keyframe-forced and disarms it.
#[derive(Debug, Default)]
pub struct KeyframeGate {
    armed: bool,
}

impl KeyframeGate {
    pub fn arm(&mut self) {
        self.armed = true;
    }

    /// Consumes the armed flag for the next submission.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.armed)
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

/// A throttle state change derived from encoder queue depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureSignal {
    pub level: PressureLevel,
    pub queue_depth: usize,
}

/// Hysteresis gate over the video encoder's queue depth: throttles above
/// [`VIDEO_HIGH_WATER`], releases at or below [`VIDEO_LOW_WATER`], with a
/// cooldown between state changes so a queue oscillating around a watermark
/// does not flap. The cooldown delays transitions, never cancels them, and
/// the critical watermark bypasses it.
pub struct PressureGate {
    throttled: bool,
    last_change: Option<Instant>,
    cooldown: Duration,
}

impl PressureGate {
    pub fn new(cooldown: Duration) -> Self {
        Self { throttled: false, last_change: None, cooldown }
    }

    pub fn is_throttled(&self) -> bool {
        self.throttled
    }

    /// Observes the current queue depth; returns a signal when the throttle
    /// state changes.
    pub fn observe(&mut self, depth: usize) -> Option<PressureSignal> {
        if !self.throttled && depth > VIDEO_HIGH_WATER {
            if depth > VIDEO_CRITICAL_WATER || self.cooldown_elapsed() {
                self.transition(true);
                return Some(PressureSignal { level: PressureLevel::High, queue_depth: depth });
            }
        } else if self.throttled && depth <= VIDEO_LOW_WATER && self.cooldown_elapsed() {
            self.transition(false);
            return Some(PressureSignal { level: PressureLevel::Low, queue_depth: depth });
        }
        None
    }

    fn transition(&mut self, throttled: bool) {
        self.throttled = throttled;
        self.last_change = Some(Instant::now());
    }

    fn cooldown_elapsed(&self) -> bool {
        self.last_change.map_or(true, |at| at.elapsed() >= self.cooldown)
    }
}

/// Terminal report a worker sends the conductor when it exits.
#[derive(Debug)]
pub struct WorkerExit {
    pub kind: TrackKind,
    pub result: Result<(), RecorderError>,
}
