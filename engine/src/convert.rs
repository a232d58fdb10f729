/// Audio sample helpers applied between the capture format and the encoder's
/// expected input: mono→stereo upmix and float→integer conversion. Selected
/// per encoder requirements by the audio pipeline; nothing here resamples.
use crate::frame::SampleData;

/// Duplicates each mono sample into a left/right pair.
pub fn upmix_mono_to_stereo(samples: &SampleData) -> SampleData {
    match samples {
        SampleData::F32(mono) => {
            let mut stereo = Vec::with_capacity(mono.len() * 2);
            for &s in mono {
                stereo.push(s);
                stereo.push(s);
            }
            SampleData::F32(stereo)
        }
        SampleData::S16(mono) => {
            let mut stereo = Vec::with_capacity(mono.len() * 2);
            for &s in mono {
                stereo.push(s);
                stereo.push(s);
            }
            SampleData::S16(stereo)
        }
    }
}

/// Converts float samples to signed 16-bit: clamp to [-1, 1], scale by
/// 32767, round to nearest. Already-integer payloads pass through unchanged.
pub fn to_s16(samples: &SampleData) -> SampleData {
    match samples {
        SampleData::F32(float) => {
            let ints = float
                .iter()
                .map(|&s| (s.clamp(-1.0, 1.0) * 32_767.0).round() as i16)
                .collect();
            SampleData::S16(ints)
        }
        SampleData::S16(ints) => SampleData::S16(ints.clone()),
    }
}
