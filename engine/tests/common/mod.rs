//! Scriptable test doubles for the engine's external collaborators: a media
//! backend whose codec support, encoder queue depths, and failure points are
//! test-controlled, plus capture-source builders that feed frames through
//! real track channels.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kinescope_engine::backend::{
    AudioEncoder, AudioProbe, ChunkCallback, ContainerMuxer, MediaBackend, MuxerInit,
    ProbeOutcome, VideoEncoder, VideoProbe,
};
use kinescope_engine::frame::{RawAudioFrame, RawVideoFrame, ReleaseGuard, SampleData};
use kinescope_engine::negotiate::{AudioPlan, VideoCodec, VideoPlan};
use kinescope_engine::{
    AudioTrack, AudioTrackSettings, Container, EncodedChunk, TrackKind, VideoTrack,
    VideoTrackSettings,
};

/// One recorded video submission.
#[derive(Debug, Clone)]
pub struct VideoSub {
    pub timestamp_us: i64,
    pub forced_keyframe: bool,
    pub width: u32,
    pub height: u32,
}

/// One recorded audio submission.
#[derive(Debug, Clone)]
pub struct AudioSub {
    pub timestamp_us: i64,
    pub channels: u16,
    pub samples: SampleData,
}

/// Everything a test wants to observe or manipulate mid-session.
pub struct TestRig {
    pub backend: Arc<dyn MediaBackend>,
    pub video_depth: Arc<AtomicUsize>,
    pub audio_depth: Arc<AtomicUsize>,
    pub video_subs: Arc<Mutex<Vec<VideoSub>>>,
    pub audio_subs: Arc<Mutex<Vec<AudioSub>>>,
    /// (kind, timestamp, keyframe) in the exact order the muxer was fed.
    pub mux_feed: Arc<Mutex<Vec<(TrackKind, i64, bool)>>>,
}

/// Builder for the mock backend.
pub struct MockBackend {
    video_codecs: Vec<VideoCodec>,
    audio_supported: bool,
    audio_accepts: Box<dyn Fn(&AudioProbe) -> bool + Send + Sync>,
    hardware: bool,
    video_configure_delay: Option<Duration>,
    video_fail_on_submit: Option<usize>,
}

impl MockBackend {
    /// A platform that encodes H.264 in hardware and accepts any audio.
    pub fn h264_mp4() -> Self {
        Self::supporting(vec![VideoCodec::H264])
    }

    pub fn supporting(video_codecs: Vec<VideoCodec>) -> Self {
        Self {
            video_codecs,
            audio_supported: true,
            audio_accepts: Box::new(|_| true),
            hardware: true,
            video_configure_delay: None,
            video_fail_on_submit: None,
        }
    }

    pub fn without_audio(mut self) -> Self {
        self.audio_supported = false;
        self
    }

    /// Restricts which audio probe candidates succeed.
    pub fn audio_accepting(
        mut self,
        accepts: impl Fn(&AudioProbe) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.audio_accepts = Box::new(accepts);
        self
    }

    /// Makes the video encoder block this long inside `configure`.
    pub fn video_configure_delay(mut self, delay: Duration) -> Self {
        self.video_configure_delay = Some(delay);
        self
    }

    /// Makes the video encoder fail on the n-th submission (0-based).
    pub fn video_failing_on_submit(mut self, nth: usize) -> Self {
        self.video_fail_on_submit = Some(nth);
        self
    }

    pub fn build(self) -> TestRig {
        let inner = Arc::new(Inner {
            video_codecs: self.video_codecs,
            audio_supported: self.audio_supported,
            audio_accepts: self.audio_accepts,
            hardware: self.hardware,
            video_configure_delay: self.video_configure_delay,
            video_fail_on_submit: self.video_fail_on_submit,
            video_depth: Arc::new(AtomicUsize::new(0)),
            audio_depth: Arc::new(AtomicUsize::new(0)),
            video_subs: Arc::new(Mutex::new(vec![])),
            audio_subs: Arc::new(Mutex::new(vec![])),
            mux_feed: Arc::new(Mutex::new(vec![])),
        });
        TestRig {
            video_depth: Arc::clone(&inner.video_depth),
            audio_depth: Arc::clone(&inner.audio_depth),
            video_subs: Arc::clone(&inner.video_subs),
            audio_subs: Arc::clone(&inner.audio_subs),
            mux_feed: Arc::clone(&inner.mux_feed),
            backend: inner,
        }
    }
}

struct Inner {
    video_codecs: Vec<VideoCodec>,
    audio_supported: bool,
    audio_accepts: Box<dyn Fn(&AudioProbe) -> bool + Send + Sync>,
    hardware: bool,
    video_configure_delay: Option<Duration>,
    video_fail_on_submit: Option<usize>,
    video_depth: Arc<AtomicUsize>,
    audio_depth: Arc<AtomicUsize>,
    video_subs: Arc<Mutex<Vec<VideoSub>>>,
    audio_subs: Arc<Mutex<Vec<AudioSub>>>,
    mux_feed: Arc<Mutex<Vec<(TrackKind, i64, bool)>>>,
}

impl MediaBackend for Inner {
    fn supports_video(&self) -> bool {
        true
    }

    fn supports_audio(&self) -> bool {
        self.audio_supported
    }

    fn probe_video(&self, probe: &VideoProbe) -> ProbeOutcome {
        ProbeOutcome {
            supported: self.video_codecs.contains(&probe.codec),
            hardware: self.hardware,
        }
    }

    fn probe_audio(&self, probe: &AudioProbe) -> ProbeOutcome {
        ProbeOutcome {
            supported: self.audio_supported && (self.audio_accepts)(probe),
            hardware: false,
        }
    }

    fn create_video_encoder(&self) -> Box<dyn VideoEncoder> {
        Box::new(MockVideoEncoder {
            output: None,
            keyframe_interval: 0,
            submitted: 0,
            configure_delay: self.video_configure_delay,
            fail_on_submit: self.video_fail_on_submit,
            depth: Arc::clone(&self.video_depth),
            subs: Arc::clone(&self.video_subs),
        })
    }

    fn create_audio_encoder(&self) -> Box<dyn AudioEncoder> {
        Box::new(MockAudioEncoder {
            output: None,
            depth: Arc::clone(&self.audio_depth),
            subs: Arc::clone(&self.audio_subs),
        })
    }

    fn create_muxer(&self, init: &MuxerInit) -> anyhow::Result<Box<dyn ContainerMuxer>> {
        Ok(Box::new(MockMuxer {
            magic: match init.container {
                Container::Mp4 => *b"fMP4",
                Container::Webm => *b"WEBM",
            },
            feed: Arc::clone(&self.mux_feed),
        }))
    }
}

struct MockVideoEncoder {
    output: Option<ChunkCallback>,
    keyframe_interval: u32,
    submitted: usize,
    configure_delay: Option<Duration>,
    fail_on_submit: Option<usize>,
    depth: Arc<AtomicUsize>,
    subs: Arc<Mutex<Vec<VideoSub>>>,
}

impl VideoEncoder for MockVideoEncoder {
    fn configure(&mut self, plan: &VideoPlan, output: ChunkCallback) -> anyhow::Result<()> {
        if let Some(delay) = self.configure_delay {
            std::thread::sleep(delay);
        }
        self.keyframe_interval = plan.keyframe_interval_frames;
        self.output = Some(output);
        Ok(())
    }

    fn submit(&mut self, frame: &RawVideoFrame, force_keyframe: bool) -> anyhow::Result<()> {
        if self.fail_on_submit == Some(self.submitted) {
            anyhow::bail!("synthetic video encoder failure");
        }
        let keyframe = force_keyframe
            || self.submitted == 0
            || (self.keyframe_interval > 0
                && self.submitted % self.keyframe_interval as usize == 0);
        self.subs.lock().unwrap().push(VideoSub {
            timestamp_us: frame.timestamp_us,
            forced_keyframe: force_keyframe,
            width: frame.width,
            height: frame.height,
        });
        self.submitted += 1;
        if let Some(output) = self.output.as_mut() {
            output(EncodedChunk::video(
                frame.timestamp_us,
                frame.duration_us.unwrap_or(0),
                keyframe,
                vec![0xE0; 32],
            ));
        }
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn close(&mut self) {}

    fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

struct MockAudioEncoder {
    output: Option<ChunkCallback>,
    depth: Arc<AtomicUsize>,
    subs: Arc<Mutex<Vec<AudioSub>>>,
}

impl AudioEncoder for MockAudioEncoder {
    fn configure(&mut self, _plan: &AudioPlan, output: ChunkCallback) -> anyhow::Result<()> {
        self.output = Some(output);
        Ok(())
    }

    fn submit(&mut self, frame: &RawAudioFrame) -> anyhow::Result<()> {
        self.subs.lock().unwrap().push(AudioSub {
            timestamp_us: frame.timestamp_us,
            channels: frame.channels,
            samples: frame.samples.clone(),
        });
        if let Some(output) = self.output.as_mut() {
            output(EncodedChunk::audio(frame.timestamp_us, 20_000, vec![0xA0; 16]));
        }
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn close(&mut self) {}

    fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

struct MockMuxer {
    magic: [u8; 4],
    feed: Arc<Mutex<Vec<(TrackKind, i64, bool)>>>,
}

impl ContainerMuxer for MockMuxer {
    fn add_video_chunk(&mut self, chunk: &EncodedChunk) -> anyhow::Result<()> {
        self.feed.lock().unwrap().push((TrackKind::Video, chunk.timestamp_us, chunk.is_keyframe));
        Ok(())
    }

    fn add_audio_chunk(&mut self, chunk: &EncodedChunk) -> anyhow::Result<()> {
        self.feed.lock().unwrap().push((TrackKind::Audio, chunk.timestamp_us, chunk.is_keyframe));
        Ok(())
    }

    fn finalize(self: Box<Self>) -> anyhow::Result<Vec<u8>> {
        let feed = self.feed.lock().unwrap();
        let mut bytes = self.magic.to_vec();
        for &(kind, _, _) in feed.iter() {
            bytes.push(match kind {
                TrackKind::Video => 0x01,
                TrackKind::Audio => 0x02,
            });
        }
        Ok(bytes)
    }
}

// ── capture-source builders ───────────────────────────────────────────────────

/// Counts issued guards and their releases so tests can assert the
/// release-exactly-once invariant end to end.
#[derive(Clone, Default)]
pub struct ReleaseCounter {
    created: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl ReleaseCounter {
    pub fn guard(&self) -> ReleaseGuard {
        self.created.fetch_add(1, Ordering::SeqCst);
        let released = Arc::clone(&self.released);
        ReleaseGuard::new(move || {
            released.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn assert_all_released(&self) {
        let created = self.created();
        assert!(created > 0, "no frames were ever yielded");
        assert_eq!(self.released(), created, "some yielded frames were never released");
    }
}

pub fn settings_1080p30() -> VideoTrackSettings {
    VideoTrackSettings { width: 1920, height: 1080, frame_rate: 30 }
}

pub fn settings_360p30() -> VideoTrackSettings {
    VideoTrackSettings { width: 640, height: 360, frame_rate: 30 }
}

/// `count` BGRA frames at `frame_rate`, timestamps starting at `base_us`.
pub fn video_frames(
    settings: VideoTrackSettings,
    count: usize,
    base_us: i64,
    counter: Option<&ReleaseCounter>,
) -> Vec<RawVideoFrame> {
    let interval = 1_000_000 / settings.frame_rate as i64;
    (0..count)
        .map(|i| {
            let frame = RawVideoFrame::new(
                vec![0u8; (settings.width * settings.height * 4) as usize],
                settings.width,
                settings.height,
                base_us + i as i64 * interval,
            )
            .with_duration(interval);
            match counter {
                Some(counter) => frame.with_release(counter.guard()),
                None => frame,
            }
        })
        .collect()
}

/// A video track fed by a background task that sends `frames` then ends.
pub fn video_source(settings: VideoTrackSettings, frames: Vec<RawVideoFrame>) -> VideoTrack {
    let (tx, track) = VideoTrack::channel(settings);
    tokio::spawn(async move {
        for frame in frames {
            if tx.send(frame).await.is_err() {
                break;
            }
        }
    });
    track
}

/// A video track whose feeder synthesizes `count` frames one at a time, so
/// long sessions never hold more than a channel's worth of pixel buffers.
/// The join handle completes once the feeder is done or the track is gone.
pub fn streaming_video_source(
    settings: VideoTrackSettings,
    count: usize,
    base_us: i64,
    pace: Duration,
    counter: Option<ReleaseCounter>,
) -> (VideoTrack, tokio::task::JoinHandle<()>) {
    let (tx, track) = VideoTrack::channel(settings);
    let handle = tokio::spawn(async move {
        let interval = 1_000_000 / settings.frame_rate as i64;
        for i in 0..count {
            let mut frame = RawVideoFrame::new(
                vec![0u8; (settings.width * settings.height * 4) as usize],
                settings.width,
                settings.height,
                base_us + i as i64 * interval,
            )
            .with_duration(interval);
            if let Some(counter) = &counter {
                frame = frame.with_release(counter.guard());
            }
            if tx.send(frame).await.is_err() {
                break;
            }
            if !pace.is_zero() {
                tokio::time::sleep(pace).await;
            }
        }
    });
    (track, handle)
}

/// An audio track fed by a background task that sends `frames` then ends.
pub fn audio_source(settings: AudioTrackSettings, frames: Vec<RawAudioFrame>) -> AudioTrack {
    let (tx, track) = AudioTrack::channel(settings);
    tokio::spawn(async move {
        for frame in frames {
            if tx.send(frame).await.is_err() {
                break;
            }
        }
    });
    track
}
