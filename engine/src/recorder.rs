/// Public recorder API.
///
/// A `Recorder` owns one session at a time. `new` validates and clamps the
/// configuration; `start` hands a capture source to the conductor and
/// returns once every active pipeline is ready; `stop` returns the finished
/// recording. Session notifications (start/stop/error/pressure) arrive on an
/// event channel the host can take with [`Recorder::take_events`].
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::backend::MediaBackend;
use crate::capture::CaptureHandle;
use crate::conductor::{self, Session};
use crate::config::RecorderConfig;
use crate::error::{RecorderError, Result};
use crate::events::RecorderEvent;
use crate::negotiate::{AudioCodec, Container, VideoCodec};

/// True when the platform exposes a video encoder API. Audio support is
/// optional and never affects this answer.
pub fn is_supported(backend: &Arc<dyn MediaBackend>) -> bool {
    backend.supports_video()
}

/// Video parameters the session actually runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveVideo {
    pub codec: VideoCodec,
    pub profile: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub bitrate: u32,
    pub hw_used: bool,
}

/// Audio parameters the session actually runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveAudio {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
}

/// Requested-vs-actual session parameters, rebuilt from capture settings
/// and negotiation results.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub video: EffectiveVideo,
    pub audio: Option<EffectiveAudio>,
}

/// The product of a finished session.
#[derive(Debug, Clone)]
pub struct RecordingResult {
    /// Finalized container bytes.
    pub bytes: Vec<u8>,
    pub container: Container,
    /// The configuration the session was asked for.
    pub requested: RecorderConfig,
    /// What it actually ran with.
    pub effective: EffectiveConfig,
    /// Wall-clock duration between start and stop.
    pub duration_ms: u64,
    /// RFC 3339 local timestamp of when the recording finished.
    pub finished_at: String,
}

/// High-fidelity archival recorder: one video track, at most one audio
/// track, one finalized container per session.
pub struct Recorder {
    config: RecorderConfig,
    backend: Arc<dyn MediaBackend>,
    session: Option<Session>,
    last_result: Option<RecordingResult>,
    event_tx: mpsc::UnboundedSender<RecorderEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<RecorderEvent>>,
}

impl Recorder {
    /// Validates and clamps `config`. When audio is requested on a platform
    /// without an audio encoder, audio is disabled for every session of this
    /// recorder; the session still records video.
    pub fn new(config: RecorderConfig, backend: Arc<dyn MediaBackend>) -> Self {
        let mut config = config.validated();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        if config.audio.is_some() && !backend.supports_audio() {
            warn!("audio requested but the platform has no audio encoder");
            let _ = event_tx.send(RecorderEvent::Warning {
                message: "platform has no audio encoder; audio disabled".into(),
            });
            config.audio = None;
        }

        Self {
            config,
            backend,
            session: None,
            last_result: None,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// The validated configuration every session will use.
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Takes the receiving end of the event channel. Yields `None` after the
    /// first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<RecorderEvent>> {
        self.event_rx.take()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Starts recording from `capture`. Returns once all active pipelines
    /// are ready and frames are flowing.
    pub async fn start(&mut self, capture: CaptureHandle) -> Result<()> {
        if self.session.is_some() {
            return Err(RecorderError::already_running());
        }
        let session = conductor::start(
            Arc::clone(&self.backend),
            &self.config,
            capture,
            self.event_tx.clone(),
        )
        .await?;
        self.session = Some(session);
        Ok(())
    }

    /// Stops the running session and returns the finalized recording.
    pub async fn stop(&mut self) -> Result<RecordingResult> {
        let session = self.session.take().ok_or_else(RecorderError::not_running)?;
        let result = session.stop().await?;
        self.last_result = Some(result.clone());
        Ok(result)
    }

    /// The most recent successful recording, if any.
    pub fn last_result(&self) -> Option<&RecordingResult> {
        self.last_result.as_ref()
    }
}
