/// Encoded output units as delivered by the encoders and consumed by the
/// muxer driver. Chunks are immutable once produced; within a track their
/// timestamps are non-decreasing (capture order modulo intentional drops).

/// Which track a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// One compressed output unit of an encoder.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub kind: TrackKind,
    /// Presentation timestamp in microseconds, zero-based per track.
    pub timestamp_us: i64,
    /// Duration in microseconds; 0 when the encoder did not report one.
    pub duration_us: i64,
    /// True when this chunk is independently decodable.
    pub is_keyframe: bool,
    /// Compressed payload.
    pub bytes: Vec<u8>,
    /// Codec initialization blob (e.g. avcC / AudioSpecificConfig), attached
    /// by the encoder when it first becomes available.
    pub codec_metadata: Option<Vec<u8>>,
}

impl EncodedChunk {
    pub fn video(timestamp_us: i64, duration_us: i64, is_keyframe: bool, bytes: Vec<u8>) -> Self {
        Self {
            kind: TrackKind::Video,
            timestamp_us,
            duration_us,
            is_keyframe,
            bytes,
            codec_metadata: None,
        }
    }

    pub fn audio(timestamp_us: i64, duration_us: i64, bytes: Vec<u8>) -> Self {
        Self {
            kind: TrackKind::Audio,
            timestamp_us,
            duration_us,
            // Audio keyframing is encoder-controlled; every chunk is a sync point.
            is_keyframe: true,
            bytes,
            codec_metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Vec<u8>) -> Self {
        self.codec_metadata = Some(metadata);
        self
    }
}
