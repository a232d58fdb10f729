/// Codec negotiation: deterministically selects the first supported
/// (video codec, container) and audio configuration from priority lists,
/// using timeout-bounded capability probes.
///
/// Probes run on a blocking thread because some platform implementations
/// hang on unsupported codecs; a timed-out probe is skipped, not fatal.
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::{AudioProbe, MediaBackend, ProbeOutcome, VideoProbe};
use crate::config::{AudioCodecPreference, AudioConfig, HwPreference, VideoCodecPreference, VideoConfig};
use crate::error::{RecorderError, Result};

/// Audio bitrate fallback ladder, probed in order when the initial
/// configuration is rejected. The sample rate never changes across
/// fallbacks; resampling is not something this engine does.
const AUDIO_FALLBACK_BITRATES: [u32; 4] = [192_000, 128_000, 96_000, 64_000];

/// Video codecs in negotiation priority order for `auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Av1,
    Hevc,
    H264,
    Vp9,
}

impl VideoCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::Av1 => "av1",
            VideoCodec::Hevc => "hevc",
            VideoCodec::H264 => "h264",
            VideoCodec::Vp9 => "vp9",
        }
    }

    /// The container implied by this codec.
    pub fn container(&self) -> Container {
        match self {
            VideoCodec::Av1 | VideoCodec::Vp9 => Container::Webm,
            VideoCodec::Hevc | VideoCodec::H264 => Container::Mp4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Opus,
    Aac,
    Mp3,
    Flac,
}

impl AudioCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCodec::Opus => "opus",
            AudioCodec::Aac => "aac",
            AudioCodec::Mp3 => "mp3",
            AudioCodec::Flac => "flac",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp4,
    Webm,
}

impl Container {
    pub fn as_str(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Webm => "webm",
        }
    }
}

/// Fully negotiated video encoding parameters.
#[derive(Debug, Clone)]
pub struct VideoPlan {
    pub codec: VideoCodec,
    /// Winning codec string, e.g. `avc1.640028`.
    pub profile: String,
    /// Encode dimensions (post-scaler).
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub bitrate: u32,
    /// 0 leaves keyframe cadence entirely to the encoder.
    pub keyframe_interval_frames: u32,
    pub hw_pref: HwPreference,
    /// Whether the probe reported a hardware encoder for this plan.
    pub hardware: bool,
}

/// Fully negotiated audio encoding parameters.
#[derive(Debug, Clone)]
pub struct AudioPlan {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    /// Channel count the encoder expects; may be wider than the capture's.
    pub channels: u16,
    pub bitrate: u32,
}

fn codecs_for(pref: VideoCodecPreference) -> &'static [VideoCodec] {
    match pref {
        VideoCodecPreference::Auto => {
            &[VideoCodec::Av1, VideoCodec::Hevc, VideoCodec::H264, VideoCodec::Vp9]
        }
        VideoCodecPreference::Av1 => &[VideoCodec::Av1],
        VideoCodecPreference::Hevc => &[VideoCodec::Hevc],
        VideoCodecPreference::H264 => &[VideoCodec::H264],
        VideoCodecPreference::Vp9 => &[VideoCodec::Vp9],
    }
}

/// Profile/level candidates per codec, probed in order.
fn profiles_for(codec: VideoCodec) -> &'static [&'static str] {
    match codec {
        VideoCodec::Av1 => &["av01.0.08M.08"],
        // Main then Main 10, across the common level ladder.
        VideoCodec::Hevc => &[
            "hev1.1.6.L93.B0",
            "hev1.1.6.L120.B0",
            "hev1.1.6.L123.B0",
            "hev1.1.6.L150.B0",
            "hev1.1.6.L153.B0",
            "hev1.1.6.L156.B0",
            "hev1.1.6.L186.B0",
            "hev1.2.4.L93.B0",
            "hev1.2.4.L120.B0",
            "hev1.2.4.L123.B0",
            "hev1.2.4.L150.B0",
            "hev1.2.4.L153.B0",
            "hev1.2.4.L156.B0",
            "hev1.2.4.L186.B0",
        ],
        // Baseline 3.1 up to High 4.0.
        VideoCodec::H264 => &[
            "avc1.42001f",
            "avc1.420028",
            "avc1.4d001f",
            "avc1.4d0028",
            "avc1.64001f",
            "avc1.640028",
        ],
        VideoCodec::Vp9 => &["vp09.00.10.08"],
    }
}

/// Runs one video probe on a blocking thread, bounded by `timeout`.
/// Returns `None` on timeout or probe panic; the candidate is skipped.
async fn bounded_video_probe(
    backend: &Arc<dyn MediaBackend>,
    probe: VideoProbe,
    timeout: Duration,
) -> Option<ProbeOutcome> {
    let backend = Arc::clone(backend);
    let profile = probe.profile.clone();
    let task = tokio::task::spawn_blocking(move || backend.probe_video(&probe));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(outcome)) => Some(outcome),
        Ok(Err(err)) => {
            warn!("video probe for {profile} panicked: {err}");
            None
        }
        Err(_) => {
            debug!("video probe for {profile} timed out");
            None
        }
    }
}

async fn bounded_audio_probe(
    backend: &Arc<dyn MediaBackend>,
    probe: AudioProbe,
    timeout: Duration,
) -> Option<ProbeOutcome> {
    let backend = Arc::clone(backend);
    let task = tokio::task::spawn_blocking(move || backend.probe_audio(&probe));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(outcome)) => Some(outcome),
        Ok(Err(err)) => {
            warn!("audio probe panicked: {err}");
            None
        }
        Err(_) => {
            debug!("audio probe timed out");
            None
        }
    }
}

/// Walks the video candidate list and returns the first supported plan plus
/// the container it implies. `container_hint` restricts the candidate set.
pub async fn negotiate_video(
    backend: &Arc<dyn MediaBackend>,
    cfg: &VideoConfig,
    encode_width: u32,
    encode_height: u32,
    container_hint: Option<Container>,
    probe_timeout: Duration,
) -> Result<(VideoPlan, Container)> {
    let codecs: Vec<VideoCodec> = codecs_for(cfg.codec_preference)
        .iter()
        .copied()
        .filter(|codec| container_hint.map_or(true, |hint| codec.container() == hint))
        .collect();

    if codecs.is_empty() {
        return Err(RecorderError::no_codec(format!(
            "codec preference {:?} cannot target container {}",
            cfg.codec_preference,
            container_hint.expect("empty set implies a hint").as_str(),
        )));
    }

    for codec in codecs {
        for profile in profiles_for(codec) {
            let probe = VideoProbe {
                codec,
                profile: (*profile).to_string(),
                width: encode_width,
                height: encode_height,
                frame_rate: cfg.frame_rate,
                bitrate: cfg.bitrate,
                hw_pref: cfg.hw_pref,
            };
            let Some(outcome) = bounded_video_probe(backend, probe, probe_timeout).await else {
                continue;
            };
            if !outcome.supported {
                debug!("video candidate {profile} rejected");
                continue;
            }
            debug!(
                "video negotiated: {} ({profile}), {}x{} @ {} fps",
                codec.as_str(),
                encode_width,
                encode_height,
                cfg.frame_rate
            );
            let plan = VideoPlan {
                codec,
                profile: (*profile).to_string(),
                width: encode_width,
                height: encode_height,
                frame_rate: cfg.frame_rate,
                bitrate: cfg.bitrate,
                keyframe_interval_frames: cfg.keyframe_interval_frames(cfg.frame_rate),
                hw_pref: cfg.hw_pref,
                hardware: outcome.hardware,
            };
            return Ok((plan, codec.container()));
        }
    }

    Err(RecorderError::no_codec(format!(
        "no supported video codec for preference {:?}",
        cfg.codec_preference
    )))
}

/// Maps the requested audio codec onto the chosen container. Opus on MP4 is
/// silently coerced to AAC; pairings the container cannot carry are
/// rejected.
pub fn audio_codec_for(pref: AudioCodecPreference, container: Container) -> Result<AudioCodec> {
    match (pref, container) {
        (AudioCodecPreference::Auto, Container::Mp4) => Ok(AudioCodec::Aac),
        (AudioCodecPreference::Auto, Container::Webm) => Ok(AudioCodec::Opus),
        (AudioCodecPreference::Opus, Container::Webm) => Ok(AudioCodec::Opus),
        (AudioCodecPreference::Opus, Container::Mp4) => {
            debug!("coercing opus to aac for mp4 output");
            Ok(AudioCodec::Aac)
        }
        (AudioCodecPreference::Aac, Container::Mp4) => Ok(AudioCodec::Aac),
        (AudioCodecPreference::Mp3, Container::Mp4) => Ok(AudioCodec::Mp3),
        (AudioCodecPreference::Flac, Container::Webm) => Ok(AudioCodec::Flac),
        (pref, container) => Err(RecorderError::audio_incompatible(format!(
            "{pref:?} audio cannot be carried in a {} container",
            container.as_str()
        ))),
    }
}

/// (channels, bitrate) candidates: the requested configuration first, then
/// the bitrate ladder at the requested channel count, then the same ladder
/// with a mono request widened to stereo.
fn audio_candidates(cfg: &AudioConfig) -> Vec<(u16, u32)> {
    let mut candidates = vec![(cfg.channels, cfg.bitrate)];
    let mut channel_options = vec![cfg.channels];
    if cfg.channels == 1 {
        channel_options.push(2);
    }
    for channels in channel_options {
        for bitrate in AUDIO_FALLBACK_BITRATES {
            if !candidates.contains(&(channels, bitrate)) {
                candidates.push((channels, bitrate));
            }
        }
    }
    candidates
}

/// Negotiates the audio configuration for an already-chosen container.
/// The configured sample rate is held fixed across every fallback.
pub async fn negotiate_audio(
    backend: &Arc<dyn MediaBackend>,
    cfg: &AudioConfig,
    container: Container,
    probe_timeout: Duration,
) -> Result<AudioPlan> {
    let codec = audio_codec_for(cfg.codec_preference, container)?;

    for (channels, bitrate) in audio_candidates(cfg) {
        let probe = AudioProbe { codec, sample_rate: cfg.sample_rate, channels, bitrate };
        let Some(outcome) = bounded_audio_probe(backend, probe, probe_timeout).await else {
            continue;
        };
        if !outcome.supported {
            debug!("audio candidate {}ch @ {bitrate} bps rejected", channels);
            continue;
        }
        debug!(
            "audio negotiated: {} {} Hz {}ch @ {bitrate} bps",
            codec.as_str(),
            cfg.sample_rate,
            channels
        );
        return Ok(AudioPlan { codec, sample_rate: cfg.sample_rate, channels, bitrate });
    }

    Err(RecorderError::no_codec(format!(
        "no supported {} configuration at {} Hz",
        codec.as_str(),
        cfg.sample_rate
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AudioEncoder, ContainerMuxer, MuxerInit, VideoEncoder};
    use crate::error::ErrorKind;
    use std::sync::Mutex;

    const TIMEOUT: Duration = Duration::from_millis(500);

    type VideoProbeFn = Box<dyn Fn(&VideoProbe) -> ProbeOutcome + Send + Sync>;
    type AudioProbeFn = Box<dyn Fn(&AudioProbe) -> ProbeOutcome + Send + Sync>;

    struct ProbeBackend {
        video: VideoProbeFn,
        audio: AudioProbeFn,
        video_log: Mutex<Vec<String>>,
        audio_log: Mutex<Vec<(u32, u16, u32)>>,
    }

    impl ProbeBackend {
        fn new(video: VideoProbeFn, audio: AudioProbeFn) -> Arc<dyn MediaBackend> {
            Arc::new(Self { video, audio, video_log: Mutex::new(vec![]), audio_log: Mutex::new(vec![]) })
        }

        fn accept_all() -> Arc<dyn MediaBackend> {
            Self::new(
                Box::new(|_| ProbeOutcome { supported: true, hardware: true }),
                Box::new(|_| ProbeOutcome { supported: true, hardware: false }),
            )
        }
    }

    impl MediaBackend for ProbeBackend {
        fn supports_video(&self) -> bool {
            true
        }
        fn supports_audio(&self) -> bool {
            true
        }
        fn probe_video(&self, probe: &VideoProbe) -> ProbeOutcome {
            self.video_log.lock().unwrap().push(probe.profile.clone());
            (self.video)(probe)
        }
        fn probe_audio(&self, probe: &AudioProbe) -> ProbeOutcome {
            self.audio_log
                .lock()
                .unwrap()
                .push((probe.sample_rate, probe.channels, probe.bitrate));
            (self.audio)(probe)
        }
        fn create_video_encoder(&self) -> Box<dyn VideoEncoder> {
            unimplemented!("not used in negotiation tests")
        }
        fn create_audio_encoder(&self) -> Box<dyn AudioEncoder> {
            unimplemented!("not used in negotiation tests")
        }
        fn create_muxer(&self, _init: &MuxerInit) -> anyhow::Result<Box<dyn ContainerMuxer>> {
            unimplemented!("not used in negotiation tests")
        }
    }

    fn video_cfg(pref: VideoCodecPreference) -> VideoConfig {
        VideoConfig { codec_preference: pref, ..VideoConfig::default() }
    }

    // ── video negotiation ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn auto_prefers_av1_and_webm() {
        let backend = ProbeBackend::accept_all();
        let (plan, container) = negotiate_video(
            &backend,
            &video_cfg(VideoCodecPreference::Auto),
            1920,
            1080,
            None,
            TIMEOUT,
        )
        .await
        .unwrap();
        assert_eq!(plan.codec, VideoCodec::Av1);
        assert_eq!(plan.profile, "av01.0.08M.08");
        assert_eq!(container, Container::Webm);
        assert!(plan.hardware);
    }

    #[tokio::test]
    async fn auto_falls_through_to_h264() {
        let backend = ProbeBackend::new(
            Box::new(|probe| ProbeOutcome {
                supported: probe.codec == VideoCodec::H264,
                hardware: false,
            }),
            Box::new(|_| ProbeOutcome::unsupported()),
        );
        let (plan, container) = negotiate_video(
            &backend,
            &video_cfg(VideoCodecPreference::Auto),
            1280,
            720,
            None,
            TIMEOUT,
        )
        .await
        .unwrap();
        assert_eq!(plan.codec, VideoCodec::H264);
        // First H.264 profile in the ladder: Baseline 3.1.
        assert_eq!(plan.profile, "avc1.42001f");
        assert_eq!(container, Container::Mp4);
    }

    #[tokio::test]
    async fn forced_codec_unsupported_is_no_codec() {
        let backend = ProbeBackend::new(
            Box::new(|_| ProbeOutcome::unsupported()),
            Box::new(|_| ProbeOutcome::unsupported()),
        );
        let err = negotiate_video(
            &backend,
            &video_cfg(VideoCodecPreference::Av1),
            1280,
            720,
            None,
            TIMEOUT,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoCodec);
    }

    #[tokio::test]
    async fn container_hint_restricts_candidates() {
        let backend = ProbeBackend::accept_all();
        let (plan, container) = negotiate_video(
            &backend,
            &video_cfg(VideoCodecPreference::Auto),
            1920,
            1080,
            Some(Container::Mp4),
            TIMEOUT,
        )
        .await
        .unwrap();
        // AV1 outranks HEVC but cannot land in MP4.
        assert_eq!(plan.codec, VideoCodec::Hevc);
        assert_eq!(container, Container::Mp4);
    }

    #[tokio::test]
    async fn hint_conflicting_with_preference_is_no_codec() {
        let backend = ProbeBackend::accept_all();
        let err = negotiate_video(
            &backend,
            &video_cfg(VideoCodecPreference::Av1),
            1920,
            1080,
            Some(Container::Mp4),
            TIMEOUT,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoCodec);
    }

    #[tokio::test]
    async fn hanging_probe_is_skipped_after_timeout() {
        let backend = ProbeBackend::new(
            Box::new(|probe| {
                if probe.codec == VideoCodec::Av1 {
                    // Simulates a platform that never answers for AV1.
                    std::thread::sleep(Duration::from_millis(400));
                }
                ProbeOutcome { supported: probe.codec == VideoCodec::Hevc, hardware: false }
            }),
            Box::new(|_| ProbeOutcome::unsupported()),
        );
        let (plan, _) = negotiate_video(
            &backend,
            &video_cfg(VideoCodecPreference::Auto),
            1920,
            1080,
            None,
            Duration::from_millis(50),
        )
        .await
        .unwrap();
        assert_eq!(plan.codec, VideoCodec::Hevc);
    }

    #[tokio::test]
    async fn keyframe_interval_is_converted_to_frames() {
        let backend = ProbeBackend::accept_all();
        let mut cfg = video_cfg(VideoCodecPreference::H264);
        cfg.frame_rate = 30;
        cfg.keyframe_interval_s = 2.0;
        let (plan, _) = negotiate_video(&backend, &cfg, 1920, 1080, None, TIMEOUT).await.unwrap();
        assert_eq!(plan.keyframe_interval_frames, 60);
    }

    // ── audio codec / container mapping ───────────────────────────────────────

    #[test]
    fn auto_audio_maps_to_container_native_codec() {
        assert_eq!(
            audio_codec_for(AudioCodecPreference::Auto, Container::Mp4).unwrap(),
            AudioCodec::Aac
        );
        assert_eq!(
            audio_codec_for(AudioCodecPreference::Auto, Container::Webm).unwrap(),
            AudioCodec::Opus
        );
    }

    #[test]
    fn opus_on_mp4_coerces_to_aac() {
        assert_eq!(
            audio_codec_for(AudioCodecPreference::Opus, Container::Mp4).unwrap(),
            AudioCodec::Aac
        );
    }

    #[test]
    fn incompatible_pairings_are_rejected() {
        for (pref, container) in [
            (AudioCodecPreference::Aac, Container::Webm),
            (AudioCodecPreference::Mp3, Container::Webm),
            (AudioCodecPreference::Flac, Container::Mp4),
        ] {
            let err = audio_codec_for(pref, container).unwrap_err();
            assert_eq!(err.kind, ErrorKind::AudioIncompatible, "{pref:?} in {container:?}");
        }
    }

    #[test]
    fn compatible_explicit_pairings_pass_through() {
        assert_eq!(
            audio_codec_for(AudioCodecPreference::Mp3, Container::Mp4).unwrap(),
            AudioCodec::Mp3
        );
        assert_eq!(
            audio_codec_for(AudioCodecPreference::Flac, Container::Webm).unwrap(),
            AudioCodec::Flac
        );
    }

    // ── audio fallback ladder ─────────────────────────────────────────────────

    fn audio_cfg(channels: u16, bitrate: u32) -> AudioConfig {
        AudioConfig { channels, bitrate, ..AudioConfig::default() }
    }

    #[test]
    fn candidates_descend_bitrate_then_widen_channels() {
        let candidates = audio_candidates(&audio_cfg(1, 128_000));
        assert_eq!(
            candidates,
            vec![
                (1, 128_000),
                (1, 192_000),
                (1, 96_000),
                (1, 64_000),
                (2, 192_000),
                (2, 128_000),
                (2, 96_000),
                (2, 64_000),
            ]
        );
    }

    #[test]
    fn stereo_request_never_narrows() {
        let candidates = audio_candidates(&audio_cfg(2, 256_000));
        assert!(candidates.iter().all(|&(channels, _)| channels == 2));
        assert_eq!(candidates[0], (2, 256_000));
    }

    #[tokio::test]
    async fn fallback_holds_sample_rate_fixed() {
        let backend = ProbeBackend::new(
            Box::new(|_| ProbeOutcome::unsupported()),
            Box::new(|probe| ProbeOutcome {
                supported: probe.bitrate == 64_000 && probe.channels == 2,
                hardware: false,
            }),
        );
        let cfg = AudioConfig { sample_rate: 44_100, ..audio_cfg(1, 128_000) };
        let plan =
            negotiate_audio(&backend, &cfg, Container::Mp4, TIMEOUT).await.unwrap();
        assert_eq!(plan.codec, AudioCodec::Aac);
        assert_eq!(plan.sample_rate, 44_100);
        assert_eq!(plan.channels, 2);
        assert_eq!(plan.bitrate, 64_000);
    }

    #[tokio::test]
    async fn exhausted_audio_fallback_is_no_codec() {
        let backend = ProbeBackend::new(
            Box::new(|_| ProbeOutcome::unsupported()),
            Box::new(|_| ProbeOutcome::unsupported()),
        );
        let err = negotiate_audio(&backend, &audio_cfg(1, 128_000), Container::Webm, TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoCodec);
    }

    #[tokio::test]
    async fn first_candidate_is_the_requested_config() {
        let backend = ProbeBackend::new(
            Box::new(|_| ProbeOutcome::unsupported()),
            Box::new(|_| ProbeOutcome { supported: true, hardware: false }),
        );
        let plan = negotiate_audio(&backend, &audio_cfg(2, 96_000), Container::Webm, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(plan.channels, 2);
        assert_eq!(plan.bitrate, 96_000);
    }
}
