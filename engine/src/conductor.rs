/// Session orchestration.
///
/// `start` extracts the capture tracks, rebuilds the effective configuration
/// from the actual capture settings, negotiates codecs, spawns the two
/// pipeline workers, and holds the ready barrier. The returned [`Session`]
/// owns the stop signal, the chunk sink, and the supervisor bookkeeping;
/// `stop` runs the stop barrier and performs the final mux on the calling
/// task.
///
/// A failed worker is fanned in by the supervisor: the first error is
/// recorded, the sibling pipeline is cancelled, and the pending `stop` call
/// returns that error instead of a result.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, timeout};
use tracing::{debug, info, warn};

use crate::audio_pipeline;
use crate::backend::{AudioTrackMeta, MediaBackend, VideoTrackMeta};
use crate::capture::CaptureHandle;
use crate::chunk::{EncodedChunk, TrackKind};
use crate::config::RecorderConfig;
use crate::error::{RecorderError, Result};
use crate::events::{PressureLevel, RecorderEvent};
use crate::mux;
use crate::negotiate::{self, Container};
use crate::pipeline::{PressureSignal, StateCell, WorkerExit};
use crate::recorder::{EffectiveAudio, EffectiveConfig, EffectiveVideo, RecordingResult};
use crate::scale;
use crate::video_pipeline;

/// Sustained high pressure is reported after these durations as
/// informational notices.
pub const SUSTAINED_PRESSURE_NOTICES: [Duration; 2] =
    [Duration::from_secs(12), Duration::from_secs(25)];

/// Grace period for collecting a worker's terminal report after its ready
/// signal was lost.
const READY_FAILURE_GRACE: Duration = Duration::from_millis(500);

/// A running recording session.
pub struct Session {
    backend: Arc<dyn MediaBackend>,
    requested: RecorderConfig,
    effective: EffectiveConfig,
    container: Container,
    video_meta: VideoTrackMeta,
    audio_meta: Option<AudioTrackMeta>,
    stop_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    error_slot: Arc<Mutex<Option<RecorderError>>>,
    chunk_rx: mpsc::UnboundedReceiver<EncodedChunk>,
    worker_handles: Vec<JoinHandle<()>>,
    monitor: JoinHandle<()>,
    event_tx: mpsc::UnboundedSender<RecorderEvent>,
    started_at: std::time::Instant,
    stop_timeout: Duration,
}

/// Starts a session: track extraction, effective config, negotiation,
/// pipeline spawn, ready barrier. Returns once every active pipeline has
/// reported ready.
pub async fn start(
    backend: Arc<dyn MediaBackend>,
    config: &RecorderConfig,
    mut capture: CaptureHandle,
    event_tx: mpsc::UnboundedSender<RecorderEvent>,
) -> Result<Session> {
    if !backend.supports_video() {
        return Err(RecorderError::not_supported());
    }

    let video_track = capture.video.take().ok_or_else(RecorderError::no_video_track)?;
    video_track.settings.validate()?;
    let video_settings = video_track.settings;

    let mut audio_track = capture.audio.take();
    let mut audio_cfg = config.audio.clone();
    if audio_cfg.is_some() && audio_track.is_none() {
        warn!("audio configured but the capture source has no audio track");
        let _ = event_tx.send(RecorderEvent::Warning {
            message: "audio track absent; recording video-only".into(),
        });
        audio_cfg = None;
    }
    if audio_cfg.is_none() {
        audio_track = None;
    }

    // The capture device has the final word on dimensions and rates.
    let mut eff_video = config.video.clone();
    eff_video.width = video_settings.width;
    eff_video.height = video_settings.height;
    eff_video.frame_rate = video_settings.frame_rate;

    if let (Some(cfg), Some(track)) = (audio_cfg.as_mut(), audio_track.as_ref()) {
        cfg.sample_rate = track.settings.sample_rate;
        cfg.channels = track.settings.channel_count.clamp(1, 2);
    }

    let scale_plan =
        scale::plan(video_settings.width, video_settings.height, eff_video.resolution_target);
    let probe_timeout = Duration::from_millis(config.timeouts.probe_ms);

    let (video_plan, container) = negotiate::negotiate_video(
        &backend,
        &eff_video,
        scale_plan.out_width,
        scale_plan.out_height,
        None,
        probe_timeout,
    )
    .await?;

    // Audio setup failure is recoverable: the session continues video-only.
    let audio_plan = match audio_cfg.as_ref() {
        Some(cfg) if audio_track.is_some() => {
            match negotiate::negotiate_audio(&backend, cfg, container, probe_timeout).await {
                Ok(plan) => Some(plan),
                Err(err) => {
                    warn!("audio negotiation failed, recording video-only: {err}");
                    let _ = event_tx
                        .send(RecorderEvent::Warning { message: format!("audio disabled: {err}") });
                    audio_track = None;
                    None
                }
            }
        }
        _ => None,
    };

    let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
    let (pressure_tx, pressure_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = watch::channel(false);
    let (exit_tx, exit_rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = watch::channel(false);
    let error_slot: Arc<Mutex<Option<RecorderError>>> = Arc::new(Mutex::new(None));

    let mut worker_handles = Vec::new();

    // ── Video worker ──────────────────────────────────────────────────────────
    let (video_ready_tx, video_ready_rx) = oneshot::channel();
    {
        let encoder = backend.create_video_encoder();
        let (state, _state_rx) = StateCell::new();
        let plan = video_plan.clone();
        let chunk_tx = chunk_tx.clone();
        let exit_tx = exit_tx.clone();
        let stop_rx = stop_rx.clone();
        let frames = video_track.frames;
        worker_handles.push(tokio::spawn(async move {
            let result = video_pipeline::run(
                encoder,
                plan,
                scale_plan,
                frames,
                chunk_tx,
                pressure_tx,
                state,
                video_ready_tx,
                stop_rx,
            )
            .await;
            let _ = exit_tx.send(WorkerExit { kind: TrackKind::Video, result });
        }));
    }

    // ── Audio worker ──────────────────────────────────────────────────────────
    let mut audio_ready_rx = None;
    if let (Some(plan), Some(track)) = (audio_plan.clone(), audio_track) {
        let (ready_tx, ready_rx) = oneshot::channel();
        audio_ready_rx = Some(ready_rx);
        let encoder = backend.create_audio_encoder();
        let (state, _state_rx) = StateCell::new();
        let chunk_tx = chunk_tx.clone();
        let exit_tx = exit_tx.clone();
        let stop_rx = stop_rx.clone();
        worker_handles.push(tokio::spawn(async move {
            let result = audio_pipeline::run(
                encoder,
                plan,
                track.frames,
                chunk_tx,
                state,
                ready_tx,
                stop_rx,
            )
            .await;
            let _ = exit_tx.send(WorkerExit { kind: TrackKind::Audio, result });
        }));
    }
    drop(chunk_tx);
    drop(exit_tx);

    // ── Supervisor and pressure monitor ───────────────────────────────────────
    let active_pipelines = worker_handles.len();
    tokio::spawn(supervise(
        exit_rx,
        active_pipelines,
        stop_tx.clone(),
        Arc::clone(&error_slot),
        event_tx.clone(),
        done_tx,
    ));
    let monitor =
        tokio::spawn(monitor_pressure(pressure_rx, event_tx.clone(), SUSTAINED_PRESSURE_NOTICES));

    let started_at = std::time::Instant::now();

    // ── Ready barrier ─────────────────────────────────────────────────────────
    let barrier = async {
        video_ready_rx.await.map_err(|_| ())?;
        if let Some(ready_rx) = audio_ready_rx {
            ready_rx.await.map_err(|_| ())?;
        }
        Ok::<(), ()>(())
    };
    match timeout(Duration::from_millis(config.timeouts.start_ms), barrier).await {
        Ok(Ok(())) => {}
        Ok(Err(())) => {
            // A worker died before reporting ready; surface its error.
            let _ = stop_tx.send(true);
            let mut done = done_rx.clone();
            let _ = timeout(READY_FAILURE_GRACE, done.wait_for(|done| *done)).await;
            let err = error_slot.lock().unwrap().clone().unwrap_or_else(|| {
                RecorderError::encoder_failed("a pipeline failed before reporting ready")
            });
            return Err(err);
        }
        Err(_) => {
            let _ = stop_tx.send(true);
            return Err(RecorderError::timeout("pipelines not ready within start deadline"));
        }
    }

    let effective = EffectiveConfig {
        video: EffectiveVideo {
            codec: video_plan.codec,
            profile: video_plan.profile.clone(),
            width: video_plan.width,
            height: video_plan.height,
            frame_rate: video_plan.frame_rate,
            bitrate: video_plan.bitrate,
            hw_used: video_plan.hardware,
        },
        audio: audio_plan.as_ref().map(|plan| EffectiveAudio {
            codec: plan.codec,
            sample_rate: plan.sample_rate,
            channels: plan.channels,
            bitrate: plan.bitrate,
        }),
    };
    let video_meta = VideoTrackMeta {
        codec: video_plan.codec,
        profile: video_plan.profile.clone(),
        width: video_plan.width,
        height: video_plan.height,
        frame_rate: video_plan.frame_rate,
    };
    let audio_meta = audio_plan.as_ref().map(|plan| AudioTrackMeta {
        codec: plan.codec,
        sample_rate: plan.sample_rate,
        channels: plan.channels,
    });

    info!(
        "recording started: {} in {} ({} pipeline{})",
        video_plan.codec.as_str(),
        container.as_str(),
        active_pipelines,
        if active_pipelines == 1 { "" } else { "s" }
    );
    let _ = event_tx.send(RecorderEvent::Started);

    Ok(Session {
        backend,
        requested: config.clone(),
        effective,
        container,
        video_meta,
        audio_meta,
        stop_tx,
        done_rx,
        error_slot,
        chunk_rx,
        worker_handles,
        monitor,
        event_tx,
        started_at,
        stop_timeout: Duration::from_millis(config.timeouts.stop_ms),
    })
}

impl Session {
    /// Cooperatively stops both pipelines, waits for their terminal reports,
    /// and muxes the collected chunks into the final container.
    pub async fn stop(mut self) -> Result<RecordingResult> {
        let _ = self.stop_tx.send(true);

        let mut done = self.done_rx.clone();
        let completed = timeout(self.stop_timeout, done.wait_for(|done| *done)).await;
        match completed {
            Ok(Ok(_)) => {}
            Ok(Err(_)) | Err(_) => {
                for handle in &self.worker_handles {
                    handle.abort();
                }
                self.monitor.abort();
                return Err(RecorderError::timeout(
                    "pipelines did not complete within stop deadline",
                ));
            }
        }
        for handle in self.worker_handles.drain(..) {
            let _ = handle.await;
        }

        if let Some(err) = self.error_slot.lock().unwrap().clone() {
            return Err(err);
        }

        // All sinks are gone; this drains the buffered chunks and ends.
        let mut chunks = Vec::new();
        while let Some(chunk) = self.chunk_rx.recv().await {
            chunks.push(chunk);
        }
        let duration_ms = self.started_at.elapsed().as_millis() as u64;
        debug!("collected {} chunks over {duration_ms} ms", chunks.len());

        let bytes = mux::finalize(
            &self.backend,
            self.container,
            self.video_meta.clone(),
            self.audio_meta.clone(),
            chunks,
        )?;

        let result = RecordingResult {
            bytes,
            container: self.container,
            requested: self.requested.clone(),
            effective: self.effective.clone(),
            duration_ms,
            finished_at: chrono::Local::now().to_rfc3339(),
        };
        info!("recording finished: {} bytes in {duration_ms} ms", result.bytes.len());
        let _ = self.event_tx.send(RecorderEvent::Stopped { bytes: result.bytes.len() });
        Ok(result)
    }
}

/// Collects worker terminal reports. The first failure cancels the sibling
/// pipeline and is kept for the pending `start`/`stop` call; `done` flips
/// once every worker has reported.
async fn supervise(
    mut exit_rx: mpsc::UnboundedReceiver<WorkerExit>,
    mut remaining: usize,
    stop_tx: watch::Sender<bool>,
    error_slot: Arc<Mutex<Option<RecorderError>>>,
    event_tx: mpsc::UnboundedSender<RecorderEvent>,
    done_tx: watch::Sender<bool>,
) {
    while remaining > 0 {
        let Some(exit) = exit_rx.recv().await else { break };
        remaining -= 1;
        let kind = match exit.kind {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
        };
        match exit.result {
            Ok(()) => debug!("{kind} pipeline completed"),
            Err(err) => {
                warn!("{kind} pipeline failed: {err}");
                let _ = event_tx
                    .send(RecorderEvent::Error { kind: err.kind, message: err.message.clone() });
                error_slot.lock().unwrap().get_or_insert(err);
                let _ = stop_tx.send(true);
            }
        }
    }
    let _ = done_tx.send(true);
}

/// Forwards pressure transitions to the event channel and reports sustained
/// high pressure at the configured marks. Ends when the video worker (the
/// only pressure source) goes away.
async fn monitor_pressure(
    mut pressure_rx: mpsc::UnboundedReceiver<PressureSignal>,
    event_tx: mpsc::UnboundedSender<RecorderEvent>,
    notices: [Duration; 2],
) {
    let mut high_since: Option<time::Instant> = None;
    let mut last_depth = 0usize;
    let mut notice_idx = 0usize;

    loop {
        let deadline = match (high_since, notices.get(notice_idx)) {
            (Some(since), Some(after)) => Some(since + *after),
            _ => None,
        };

        tokio::select! {
            signal = pressure_rx.recv() => {
                let Some(signal) = signal else { break };
                last_depth = signal.queue_depth;
                let _ = event_tx.send(RecorderEvent::Pressure {
                    level: signal.level,
                    queue_depth: signal.queue_depth,
                });
                match signal.level {
                    PressureLevel::High => {
                        if high_since.is_none() {
                            high_since = Some(time::Instant::now());
                            notice_idx = 0;
                        }
                    }
                    PressureLevel::Low => {
                        high_since = None;
                        notice_idx = 0;
                    }
                }
            }
            _ = time::sleep_until(deadline.unwrap_or_else(time::Instant::now)), if deadline.is_some() => {
                let for_secs = notices[notice_idx].as_secs();
                info!("sustained encoder pressure for {for_secs}s (queue {last_depth})");
                let _ = event_tx.send(RecorderEvent::SustainedPressure {
                    for_secs,
                    queue_depth: last_depth,
                });
                notice_idx += 1;
            }
        }
    }
}
