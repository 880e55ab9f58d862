//! Linear-interpolation sample-rate conversion to the canonical format.
//!
//! Adapted from the donor's Whisper-targeting resampler: same conversion-ratio
//! bookkeeping and linear-interpolation core, generalized so any source
//! rate/channel count converges on 16 kHz mono rather than a hardcoded target.

use crate::audio::types::{AudioError, CANONICAL_SAMPLE_RATE_HZ};
use tracing::debug;

pub struct Resampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: u16,
    conversion_ratio: f64,
}

impl Resampler {
    pub fn new(source_sample_rate: u32, channels: u16) -> Result<Self, AudioError> {
        if source_sample_rate == 0 {
            return Err(AudioError::ProcessingFailed {
                message: "source sample rate must be greater than zero".to_string(),
            });
        }
        if channels == 0 {
            return Err(AudioError::ProcessingFailed {
                message: "channel count must be greater than zero".to_string(),
            });
        }

        let conversion_ratio = CANONICAL_SAMPLE_RATE_HZ as f64 / source_sample_rate as f64;
        Ok(Self {
            source_sample_rate,
            target_sample_rate: CANONICAL_SAMPLE_RATE_HZ,
            channels,
            conversion_ratio,
        })
    }

    pub fn needs_resampling(&self) -> bool {
        self.source_sample_rate != self.target_sample_rate
    }

    /// Resample interleaved samples of `self.channels` channels down to mono
    /// at the canonical rate.
    pub fn process_to_mono(&self, samples: &[f32]) -> Vec<f32> {
        let mono = self.to_mono(samples);
        if !self.needs_resampling() {
            return mono;
        }
        let resampled = self.resample_mono(&mono);
        debug!(
            from_hz = self.source_sample_rate,
            to_hz = self.target_sample_rate,
            in_samples = mono.len(),
            out_samples = resampled.len(),
            "resampled audio to canonical format"
        );
        resampled
    }

    fn to_mono(&self, samples: &[f32]) -> Vec<f32> {
        let channels = self.channels as usize;
        if channels == 1 {
            return samples.to_vec();
        }
        let frames = samples.len() / channels;
        let mut out = Vec::with_capacity(frames);
        for frame in 0..frames {
            let mut sum = 0.0f32;
            for ch in 0..channels {
                sum += samples[frame * channels + ch];
            }
            out.push(sum / channels as f32);
        }
        out
    }

    fn resample_mono(&self, samples: &[f32]) -> Vec<f32> {
        if samples.is_empty() {
            return Vec::new();
        }
        let input_len = samples.len();
        let output_len = (input_len as f64 * self.conversion_ratio) as usize;
        let mut output = Vec::with_capacity(output_len);

        for i in 0..output_len {
            let input_index = i as f64 / self.conversion_ratio;
            let floor_idx = input_index.floor() as usize;
            let ceil_idx = (input_index.ceil() as usize).min(input_len - 1);

            if floor_idx == ceil_idx {
                output.push(samples[floor_idx]);
            } else {
                let fraction = (input_index - floor_idx as f64) as f32;
                let lo = samples[floor_idx];
                let hi = samples[ceil_idx];
                output.push(lo + (hi - lo) * fraction);
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_wave(sample_rate: u32, duration_s: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * duration_s) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
            })
            .collect()
    }

    #[test]
    fn passthrough_when_already_canonical() {
        let r = Resampler::new(16_000, 1).unwrap();
        assert!(!r.needs_resampling());
        let input = sine_wave(16_000, 1.0);
        let output = r.process_to_mono(&input);
        assert_eq!(output.len(), input.len());
    }

    #[test]
    fn downsamples_48k_to_16k_within_tolerance() {
        let r = Resampler::new(48_000, 1).unwrap();
        let input = sine_wave(48_000, 1.0);
        let output = r.process_to_mono(&input);
        let expected = input.len() / 3;
        let tolerance = expected / 10;
        assert!((output.len() as i64 - expected as i64).abs() < tolerance as i64);
    }

    #[test]
    fn collapses_stereo_to_mono() {
        let r = Resampler::new(16_000, 2).unwrap();
        let mono = sine_wave(16_000, 0.5);
        let mut stereo = Vec::with_capacity(mono.len() * 2);
        for s in &mono {
            stereo.push(*s);
            stereo.push(*s);
        }
        let output = r.process_to_mono(&stereo);
        assert_eq!(output.len(), mono.len());
    }

    #[test]
    fn rejects_zero_sample_rate() {
        assert!(Resampler::new(0, 1).is_err());
    }
}
