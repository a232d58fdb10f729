/// Muxer driver: merges the two chunk streams into one timestamp-ordered
/// sequence and feeds it through a container muxer to produce the final
/// bytes. The sort is stable over the conductor's arrival order, so chunks
/// sharing a timestamp keep the order in which they were received.
use std::sync::Arc;

use tracing::debug;

use crate::backend::{AudioTrackMeta, ContainerMuxer, MediaBackend, MuxerInit, VideoTrackMeta};
use crate::chunk::{EncodedChunk, TrackKind};
use crate::error::{RecorderError, Result};
use crate::negotiate::Container;

/// Muxes `chunks` (in conductor arrival order) into a finalized container.
pub fn finalize(
    backend: &Arc<dyn MediaBackend>,
    container: Container,
    video: VideoTrackMeta,
    audio: Option<AudioTrackMeta>,
    mut chunks: Vec<EncodedChunk>,
) -> Result<Vec<u8>> {
    if chunks.is_empty() {
        return Err(RecorderError::mux_failed("no encoded chunks to mux"));
    }

    // Stable: equal timestamps keep arrival order.
    chunks.sort_by_key(|chunk| chunk.timestamp_us);

    let init = MuxerInit {
        container,
        fragmented: container == Container::Mp4,
        zero_base_timestamps: true,
        video,
        audio,
    };

    let mut muxer: Box<dyn ContainerMuxer> = backend
        .create_muxer(&init)
        .map_err(|err| RecorderError::mux_failed(format!("muxer init: {err:#}")))?;

    let total = chunks.len();
    for chunk in &chunks {
        let fed = match chunk.kind {
            TrackKind::Video => muxer.add_video_chunk(chunk),
            TrackKind::Audio => muxer.add_audio_chunk(chunk),
        };
        fed.map_err(|err| {
            RecorderError::mux_failed(format!(
                "chunk at {} us rejected: {err:#}",
                chunk.timestamp_us
            ))
        })?;
    }

    let bytes = muxer
        .finalize()
        .map_err(|err| RecorderError::mux_failed(format!("finalize: {err:#}")))?;

    debug!("muxed {total} chunks into {} {} bytes", bytes.len(), container.as_str());
    Ok(bytes)
}
