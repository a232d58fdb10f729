/// Raw media frames as yielded by a capture source.
///
/// Frames own their pixel/PCM memory and move (never copy) across the
/// capture→pipeline boundary. Releasing a frame is dropping it; a frame may
/// carry a [`ReleaseGuard`] so sources backed by platform-allocated buffers
/// can run their release callback exactly once when the owning stage drops
/// the frame, whichever loop branch that happens on.
use std::fmt;

/// On-drop hook tied to a frame's backing memory.
///
/// The hook runs exactly once, when the guard (and therefore the frame that
/// owns it) is dropped.
pub struct ReleaseGuard(Option<Box<dyn FnOnce() + Send>>);

impl ReleaseGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(release)))
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl fmt::Debug for ReleaseGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReleaseGuard")
    }
}

/// A single uncompressed video frame as tightly-packed BGRA8 pixels.
#[derive(Debug)]
pub struct RawVideoFrame {
    /// Row-major BGRA pixels: width × height × 4 bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic capture timestamp in microseconds.
    pub timestamp_us: i64,
    /// Capture-reported display duration in microseconds, when known.
    /// Never synthesized when absent.
    pub duration_us: Option<i64>,
    release: Option<ReleaseGuard>,
}

impl RawVideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_us: i64) -> Self {
        Self { data, width, height, timestamp_us, duration_us: None, release: None }
    }

    pub fn with_duration(mut self, duration_us: i64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    /// Attaches a release hook for platform-owned backing memory.
    pub fn with_release(mut self, guard: ReleaseGuard) -> Self {
        self.release = Some(guard);
        self
    }
}

/// Sample encoding of a raw audio frame's PCM payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
    S16,
}

/// PCM payload of an audio frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    F32(Vec<f32>),
    S16(Vec<i16>),
}

impl SampleData {
    pub fn format(&self) -> SampleFormat {
        match self {
            SampleData::F32(_) => SampleFormat::F32,
            SampleData::S16(_) => SampleFormat::S16,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleData::F32(samples) => samples.len(),
            SampleData::S16(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Memory layout of a multi-channel PCM payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// [L0, R0, L1, R1, …]
    Interleaved,
    /// [L0, L1, …, R0, R1, …]
    Planar,
}

/// A chunk of uncompressed PCM audio from the capture source.
#[derive(Debug)]
pub struct RawAudioFrame {
    pub samples: SampleData,
    pub layout: SampleLayout,
    pub sample_rate: u32,
    pub channels: u16,
    /// Sample frames per channel in this chunk.
    pub num_frames: usize,
    /// Monotonic capture timestamp in microseconds.
    pub timestamp_us: i64,
    release: Option<ReleaseGuard>,
}

impl RawAudioFrame {
    pub fn new(
        samples: SampleData,
        layout: SampleLayout,
        sample_rate: u32,
        channels: u16,
        timestamp_us: i64,
    ) -> Self {
        let num_frames = if channels == 0 { 0 } else { samples.len() / channels as usize };
        Self { samples, layout, sample_rate, channels, num_frames, timestamp_us, release: None }
    }

    /// Attaches a release hook for platform-owned backing memory.
    pub fn with_release(mut self, guard: ReleaseGuard) -> Self {
        self.release = Some(guard);
        self
    }
}
