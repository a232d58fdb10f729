/// Audio encoding worker.
///
/// Owns the audio encoder for the session, pulls raw PCM frames, normalizes
/// their timestamps, applies the channel/sample-rate/format policies, and
/// submits to the encoder. Unlike the video worker it never drops under
/// backpressure — audio frames are small, so the loop rides out a backlogged
/// encoder with short sleeps — and it never forces keyframes; audio sync
/// points are encoder-controlled.
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::backend::AudioEncoder;
use crate::chunk::EncodedChunk;
use crate::convert;
use crate::error::{ErrorKind, RecorderError};
use crate::frame::{RawAudioFrame, SampleFormat, SampleLayout};
use crate::negotiate::{AudioCodec, AudioPlan};
use crate::pipeline::{
    PipelineState, StateCell, AUDIO_DRAIN_SLEEP, AUDIO_HIGH_WATER, AUDIO_RESUME_WATER,
};

/// Runs the audio pipeline to completion. The encoder is flushed and closed
/// on every exit path.
pub async fn run(
    mut encoder: Box<dyn AudioEncoder>,
    plan: AudioPlan,
    mut frames: mpsc::Receiver<RawAudioFrame>,
    chunk_tx: mpsc::UnboundedSender<EncodedChunk>,
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
        let err = RecorderError::encoder_failed(format!("audio encoder configure: {err:#}"));
        state.set(PipelineState::Failed(ErrorKind::EncoderFailed));
        return Err(err);
    }

    state.set(PipelineState::Ready);
    let _ = ready_tx.send(());
    state.set(PipelineState::Running);
    info!(
        "audio pipeline running: {} {} Hz {}ch",
        plan.codec.as_str(),
        plan.sample_rate,
        plan.channels
    );

    let mut t0: Option<i64> = None;
    let mut dropped: u64 = 0;

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
                None => break Ok(()),
            },
        };

        let origin = *t0.get_or_insert(frame.timestamp_us);
        frame.timestamp_us -= origin;

        // Blocking drain: a backlogged encoder is ridden out, not shed.
        if encoder.queue_depth() > AUDIO_HIGH_WATER {
            debug!("audio encoder backlogged ({} pending), draining", encoder.queue_depth());
            let mut stop_requested = false;
            while encoder.queue_depth() > AUDIO_RESUME_WATER {
                if *stop_rx.borrow() {
                    stop_requested = true;
                    break;
                }
                tokio::time::sleep(AUDIO_DRAIN_SLEEP).await;
            }
            if stop_requested {
                drop(frame);
                break Ok(());
            }
        }

        if frame.sample_rate != plan.sample_rate {
            debug!(
                "dropping audio frame at {} Hz (session runs at {} Hz)",
                frame.sample_rate, plan.sample_rate
            );
            dropped += 1;
            drop(frame);
            continue;
        }

        let needs_upmix = frame.channels == 1 && plan.channels == 2;
        if !needs_upmix && frame.channels != plan.channels {
            debug!(
                "dropping {}ch audio frame (encoder expects {}ch)",
                frame.channels, plan.channels
            );
            dropped += 1;
            drop(frame);
            continue;
        }

        let needs_s16 =
            plan.codec == AudioCodec::Aac && frame.samples.format() == SampleFormat::F32;

        let submit_result = if needs_upmix || needs_s16 {
            let samples = match (needs_upmix, needs_s16) {
                (true, false) => convert::upmix_mono_to_stereo(&frame.samples),
                (false, true) => convert::to_s16(&frame.samples),
                _ => convert::to_s16(&convert::upmix_mono_to_stereo(&frame.samples)),
            };
            let layout = if needs_upmix { SampleLayout::Interleaved } else { frame.layout };
            let converted = RawAudioFrame::new(
                samples,
                layout,
                frame.sample_rate,
                plan.channels,
                frame.timestamp_us,
            );
            encoder.submit(&converted)
            // The converted intermediate is released here, the original below.
        } else {
            encoder.submit(&frame)
        };
        drop(frame);

        if let Err(err) = submit_result {
            break Err(RecorderError::encoder_failed(format!("audio submit: {err:#}")));
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
                    debug!("audio pipeline stopped ({dropped} dropped)");
                    Ok(())
                }
                Err(err) => {
                    state.set(PipelineState::Failed(ErrorKind::EncoderFailed));
                    Err(RecorderError::encoder_failed(format!("audio flush: {err:#}")))
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
