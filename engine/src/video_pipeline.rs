/// Video encoding worker.
///
/// Owns the video encoder for the session, pulls raw frames from the capture
/// track, normalizes their timestamps to the first frame, applies the
/// backpressure drop policy and conditional downscale, and submits to the
/// encoder. Encoded chunks flow out through the conductor's sink from the
/// encoder callback. Every frame that enters the loop is released before
/// the next iteration, whichever branch handled it.
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::backend::VideoEncoder;
use crate::chunk::EncodedChunk;
use crate::error::{ErrorKind, RecorderError};
use crate::frame::RawVideoFrame;
use crate::negotiate::VideoPlan;
use crate::pipeline::{
    KeyframeGate, PipelineState, PressureGate, PressureSignal, StateCell, PRESSURE_COOLDOWN,
    VIDEO_CRITICAL_WATER, VIDEO_HIGH_WATER,
};
use crate::scale::{self, ScalePlan};

/// Runs the video pipeline to completion. Returns when the source ends, a
/// stop is requested, or the encoder fails; the encoder is flushed and
/// closed on every exit path.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    mut encoder: Box<dyn VideoEncoder>,
    plan: VideoPlan,
    scale_plan: ScalePlan,
    mut frames: mpsc::Receiver<RawVideoFrame>,
    chunk_tx: mpsc::UnboundedSender<EncodedChunk>,
    pressure_tx: mpsc::UnboundedSender<PressureSignal>,
    state: StateCell,
    ready_tx: oneshot::Sender<()>,
    mut stop_rx: watch::Receiver<bool>,
) -> Result<(), RecorderError> {
    state.set(PipelineState::Negotiating);
    let sink = chunk_tx.clone();
    if let Err(err) = encoder.configure(
        &plan,
        Box::new(move |chunk| {
            let _ = sink.send(chunk);
        }),
    ) {
        let err = RecorderError::encoder_failed(format!("video encoder configure: {err:#}"));
        state.set(PipelineState::Failed(ErrorKind::EncoderFailed));
        return Err(err);
    }

    state.set(PipelineState::Ready);
    let _ = ready_tx.send(());
    state.set(PipelineState::Running);
    info!(
        "video pipeline running: {} {}x{} @ {} fps (scale bypass: {})",
        plan.codec.as_str(),
        scale_plan.out_width,
        scale_plan.out_height,
        plan.frame_rate,
        scale_plan.bypass
    );

    let mut t0: Option<i64> = None;
    let mut gate = KeyframeGate::default();
    let mut pressure = PressureGate::new(PRESSURE_COOLDOWN);
    let mut dropped: u64 = 0;
    let mut submitted: u64 = 0;

    let result = loop {
        if *stop_rx.borrow_and_update() {
            break Ok(());
        }

        let mut frame = tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break Ok(());
                }
                continue;
            }
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                // Capture ended: drain what the encoder still holds.
                None => break Ok(()),
            },
        };

        let origin = *t0.get_or_insert(frame.timestamp_us);
        frame.timestamp_us -= origin;

        let depth = encoder.queue_depth();
        if depth > VIDEO_HIGH_WATER {
            // Encoder cannot keep up: shed this frame and make sure the next
            // accepted one restores decodability.
            gate.arm();
            dropped += 1;
            if depth > VIDEO_CRITICAL_WATER {
                warn!("video encoder queue critical ({depth} pending)");
            }
            if let Some(signal) = pressure.observe(depth) {
                let _ = pressure_tx.send(signal);
            }
            drop(frame);
            continue;
        }
        if let Some(signal) = pressure.observe(depth) {
            let _ = pressure_tx.send(signal);
        }

        let force_keyframe = gate.take();
        let submit_result = if scale_plan.bypass {
            encoder.submit(&frame, force_keyframe)
        } else {
            let scaled = scale::scale_frame(&frame, scale_plan.out_width, scale_plan.out_height);
            encoder.submit(&scaled, force_keyframe)
            // The scaled intermediate is released here, the original below.
        };
        drop(frame);

        match submit_result {
            Ok(()) => submitted += 1,
            Err(err) => {
                break Err(RecorderError::encoder_failed(format!("video submit: {err:#}")));
            }
        }
    };

    match result {
        Ok(()) => {
            state.set(PipelineState::Draining);
            let flushed = encoder.flush();
            encoder.close();
            match flushed {
                Ok(()) => {
                    state.set(PipelineState::Stopped);
                    debug!("video pipeline stopped ({submitted} submitted, {dropped} dropped)");
                    Ok(())
                }
                Err(err) => {
                    state.set(PipelineState::Failed(ErrorKind::EncoderFailed));
                    Err(RecorderError::encoder_failed(format!("video flush: {err:#}")))
                }
            }
        }
        Err(err) => {
            encoder.close();
            state.set(PipelineState::Failed(err.kind));
            Err(err)
        }
    }
}
