//! Noise Suppressor (§4.C): spectral-subtraction-style reduction, invoked only
//! when SNR is below the configured threshold. Failure here is always
//! non-fatal to the caller — see `pipeline::run_batch` and
//! `session::actor::process_window`, which fall back to the original window.

use rustfft::{num_complex::Complex, FftPlanner};

use crate::audio::types::{AudioError, AudioWindow};

/// Apply spectral subtraction using the quietest 10% of frames as a noise
/// floor estimate. Output has the same sample count and canonical format as
/// the input — the suppressor only attenuates magnitude, never resamples.
pub fn reduce_noise(window: &AudioWindow) -> Result<AudioWindow, AudioError> {
    let samples = &window.samples;
    if samples.len() < 4 {
        return Err(AudioError::ProcessingFailed {
            message: "window too short for spectral subtraction".to_string(),
        });
    }

    let fft_len = samples.len().next_power_of_two();
    let mut spectrum: Vec<Complex<f32>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
    spectrum.resize(fft_len, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_len);
    fft.process(&mut spectrum);

    let noise_floor = estimate_noise_floor(&spectrum);

    for bin in spectrum.iter_mut() {
        let magnitude = bin.norm();
        let phase = bin.arg();
        let attenuated = (magnitude - noise_floor).max(0.1 * magnitude);
        *bin = Complex::from_polar(attenuated, phase);
    }

    let ifft = planner.plan_fft_inverse(fft_len);
    ifft.process(&mut spectrum);

    let scale = 1.0 / fft_len as f32;
    let cleaned: Vec<f32> = spectrum
        .iter()
        .take(samples.len())
        .map(|c| (c.re * scale).clamp(-1.0, 1.0))
        .collect();

    Ok(AudioWindow {
        samples: cleaned,
        sample_rate_hz: window.sample_rate_hz,
        channels: window.channels,
        bit_depth: window.bit_depth,
    })
}

fn estimate_noise_floor(spectrum: &[Complex<f32>]) -> f32 {
    let mut magnitudes: Vec<f32> = spectrum.iter().map(|c| c.norm()).collect();
    magnitudes.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let cutoff = (magnitudes.len() / 10).max(1);
    magnitudes[..cutoff].iter().sum::<f32>() / cutoff as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_sample_count() {
        let window = AudioWindow {
            samples: vec![0.1; 1024],
            sample_rate_hz: 16_000,
            channels: 1,
            bit_depth: 16,
        };
        let cleaned = reduce_noise(&window).unwrap();
        assert_eq!(cleaned.samples.len(), window.samples.len());
    }

    #[test]
    fn rejects_degenerate_windows_without_panicking() {
        let window = AudioWindow {
            samples: vec![0.0; 2],
            sample_rate_hz: 16_000,
            channels: 1,
            bit_depth: 16,
        };
        assert!(reduce_noise(&window).is_err());
    }
}
