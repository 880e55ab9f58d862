//! Quality Assessor (§4.B). A pure function from window samples to metrics;
//! formulas match the reference implementation exactly, epsilon included.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::audio::types::AudioWindow;

const EPSILON: f32 = 1e-10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpectralBands {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub snr_db: f32,
    pub clarity: f32,
    pub volume_rms: f32,
    pub spectral_energy: SpectralBands,
    pub distortion: f32,
}

/// Compute quality metrics for a window. Never fails; on a degenerate
/// (silent) window the formulas still produce finite values because of the
/// epsilon terms.
pub fn assess(window: &AudioWindow) -> QualityMetrics {
    let normalized = normalize(&window.samples);

    let mean = mean_of(&normalized);
    let signal_power = normalized.iter().map(|x| x * x).sum::<f32>() / normalized.len().max(1) as f32;
    let noise_power = variance(&normalized, mean);
    let snr_db = 10.0 * ((signal_power / (noise_power + EPSILON)).log10());
    let clarity = ((snr_db + 10.0) / 30.0).clamp(0.0, 1.0);
    let volume_rms = signal_power.sqrt();

    let abs_mean = normalized.iter().map(|x| x.abs()).sum::<f32>() / normalized.len().max(1) as f32;
    let std_dev = variance(&normalized, mean).sqrt();
    let distortion = (std_dev / (abs_mean + EPSILON)).clamp(0.0, 1.0);

    let spectral_energy = band_energy(&normalized, window.sample_rate_hz);

    QualityMetrics {
        snr_db,
        clarity,
        volume_rms,
        spectral_energy,
        distortion,
    }
}

fn normalize(samples: &[f32]) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
    if peak <= EPSILON {
        return samples.to_vec();
    }
    samples.iter().map(|s| s / peak).collect()
}

fn mean_of(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f32>() / samples.len() as f32
}

fn variance(samples: &[f32], mean: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / samples.len() as f32
}

fn band_energy(samples: &[f32], sample_rate_hz: u32) -> SpectralBands {
    if samples.is_empty() {
        return SpectralBands { low: 0.0, mid: 0.0, high: 0.0 };
    }

    let fft_len = samples.len().next_power_of_two();
    let mut buffer: Vec<Complex<f32>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
    buffer.resize(fft_len, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_len);
    fft.process(&mut buffer);

    let bin_hz = sample_rate_hz as f32 / fft_len as f32;
    let magnitudes: Vec<f32> = buffer[..fft_len / 2].iter().map(|c| c.norm()).collect();

    SpectralBands {
        low: band_mean(&magnitudes, bin_hz, 80.0, 250.0),
        mid: band_mean(&magnitudes, bin_hz, 250.0, 2000.0),
        high: band_mean(&magnitudes, bin_hz, 2000.0, 8000.0),
    }
}

fn band_mean(magnitudes: &[f32], bin_hz: f32, low_hz: f32, high_hz: f32) -> f32 {
    let lo_bin = (low_hz / bin_hz).floor() as usize;
    let hi_bin = ((high_hz / bin_hz).ceil() as usize).min(magnitudes.len());
    if lo_bin >= hi_bin {
        return 0.0;
    }
    let slice = &magnitudes[lo_bin..hi_bin];
    slice.iter().sum::<f32>() / slice.len() as f32
}
