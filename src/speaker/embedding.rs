//! Embedding Extractor (§4.D): 13 MFCCs over a 2048-point FFT with 512-sample
//! hop, aggregated into a 39-vector of [mean(MFCC), std(MFCC), mean(ΔMFCC)].
//!
//! The donor's `diarization::embedder` produces a 512-dim heuristic embedding
//! from frame energy/ZCR/spectral statistics because its ONNX inference path
//! was never wired up; this extractor keeps that module's shape (struct,
//! async-friendly free function, zero-vector-on-failure-with-a-logged-warning)
//! but implements the literal MFCC formula this service is specified against.

use rustfft::{num_complex::Complex, FftPlanner};
use tracing::warn;

use crate::speaker::types::{Embedding, EMBEDDING_DIM};

const FFT_LEN: usize = 2048;
const HOP: usize = 512;
const N_MFCC: usize = 13;
const N_MEL_FILTERS: usize = 26;

/// Extract the 39-dim embedding from a canonical-format window's samples.
/// Returns a zero vector and logs a warning on any numerical failure, so
/// downstream clustering always has a well-formed (if uninformative) input.
pub fn extract(samples: &[f32], sample_rate_hz: u32) -> Embedding {
    match try_extract(samples, sample_rate_hz) {
        Ok(embedding) => embedding,
        Err(reason) => {
            warn!(reason, "embedding extraction failed, returning zero vector");
            Embedding::zero()
        }
    }
}

fn try_extract(samples: &[f32], sample_rate_hz: u32) -> Result<Embedding, &'static str> {
    if samples.len() < FFT_LEN {
        return Err("window shorter than one FFT frame");
    }

    let filterbank = mel_filterbank(sample_rate_hz, FFT_LEN, N_MEL_FILTERS);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FFT_LEN);
    let window = hamming_window(FFT_LEN);

    let mut mfcc_frames: Vec<[f32; N_MFCC]> = Vec::new();
    let mut start = 0;
    while start + FFT_LEN <= samples.len() {
        let frame = &samples[start..start + FFT_LEN];
        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .zip(window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        fft.process(&mut buffer);

        let power: Vec<f32> = buffer[..FFT_LEN / 2 + 1]
            .iter()
            .map(|c| c.norm_sqr() / FFT_LEN as f32)
            .collect();

        let mel_energies: Vec<f32> = filterbank
            .iter()
            .map(|filt| {
                let energy: f32 = filt.iter().zip(power.iter()).map(|(w, p)| w * p).sum();
                (energy.max(1e-10)).ln()
            })
            .collect();

        mfcc_frames.push(dct2_first_n(&mel_energies, N_MFCC));
        start += HOP;
    }

    if mfcc_frames.is_empty() {
        return Err("no complete frames available");
    }

    let mean = coefficient_stat(&mfcc_frames, |values| {
        values.iter().sum::<f32>() / values.len() as f32
    });
    let std = coefficient_stat(&mfcc_frames, |values| {
        let m = values.iter().sum::<f32>() / values.len() as f32;
        (values.iter().map(|v| (v - m).powi(2)).sum::<f32>() / values.len() as f32).sqrt()
    });

    let deltas = first_order_deltas(&mfcc_frames);
    let mean_delta = if deltas.is_empty() {
        [0.0; N_MFCC]
    } else {
        coefficient_stat(&deltas, |values| values.iter().sum::<f32>() / values.len() as f32)
    };

    let mut vector = Vec::with_capacity(EMBEDDING_DIM);
    vector.extend_from_slice(&mean);
    vector.extend_from_slice(&std);
    vector.extend_from_slice(&mean_delta);
    debug_assert_eq!(vector.len(), EMBEDDING_DIM);

    Ok(Embedding(vector))
}

fn coefficient_stat(frames: &[[f32; N_MFCC]], f: impl Fn(&[f32]) -> f32) -> [f32; N_MFCC] {
    let mut out = [0.0; N_MFCC];
    for coeff in 0..N_MFCC {
        let column: Vec<f32> = frames.iter().map(|frame| frame[coeff]).collect();
        out[coeff] = f(&column);
    }
    out
}

fn first_order_deltas(frames: &[[f32; N_MFCC]]) -> Vec<[f32; N_MFCC]> {
    if frames.len() < 2 {
        return Vec::new();
    }
    (1..frames.len())
        .map(|i| {
            let mut delta = [0.0; N_MFCC];
            for c in 0..N_MFCC {
                delta[c] = frames[i][c] - frames[i - 1][c];
            }
            delta
        })
        .collect()
}

fn hamming_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| 0.54 - 0.46 * (2.0 * std::f32::consts::PI * n as f32 / (len - 1) as f32).cos())
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank over `num_filters` bands spanning the Nyquist range.
fn mel_filterbank(sample_rate_hz: u32, fft_len: usize, num_filters: usize) -> Vec<Vec<f32>> {
    let n_bins = fft_len / 2 + 1;
    let max_hz = sample_rate_hz as f32 / 2.0;
    let max_mel = hz_to_mel(max_hz);

    let mel_points: Vec<f32> = (0..=num_filters + 1)
        .map(|i| i as f32 * max_mel / (num_filters + 1) as f32)
        .collect();
    let hz_points: Vec<f32> = mel_points.iter().map(|&m| mel_to_hz(m)).collect();
    let bin_points: Vec<usize> = hz_points
        .iter()
        .map(|&hz| ((fft_len as f32 + 1.0) * hz / sample_rate_hz as f32).floor() as usize)
        .map(|b| b.min(n_bins - 1))
        .collect();

    (0..num_filters)
        .map(|m| {
            let mut filter = vec![0.0f32; n_bins];
            let (left, center, right) = (bin_points[m], bin_points[m + 1], bin_points[m + 2]);
            for bin in left..center.max(left + 1) {
                if bin < n_bins && center > left {
                    filter[bin] = (bin - left) as f32 / (center - left) as f32;
                }
            }
            for bin in center..right.max(center + 1) {
                if bin < n_bins && right > center {
                    filter[bin] = (right - bin) as f32 / (right - center) as f32;
                }
            }
            filter
        })
        .collect()
}

/// DCT-II over `log_mel_energies`, keeping only the first `n` coefficients —
/// the standard MFCC step after mel-filterbank log energies.
fn dct2_first_n(log_mel_energies: &[f32], n: usize) -> [f32; N_MFCC] {
    let mut out = [0.0f32; N_MFCC];
    let len = log_mel_energies.len();
    for (k, slot) in out.iter_mut().enumerate().take(n) {
        let mut sum = 0.0f32;
        for (i, &energy) in log_mel_energies.iter().enumerate() {
            sum += energy * (std::f32::consts::PI * k as f32 * (2.0 * i as f32 + 1.0) / (2.0 * len as f32)).cos();
        }
        *slot = sum;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_a_fixed_39_dimensional_vector() {
        let samples: Vec<f32> = (0..32_000)
            .map(|i| (2.0 * std::f32::consts::PI * 200.0 * i as f32 / 16_000.0).sin())
            .collect();
        let embedding = extract(&samples, 16_000);
        assert_eq!(embedding.len(), EMBEDDING_DIM);
        assert!(embedding.0.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn returns_zero_vector_on_too_short_input() {
        let embedding = extract(&[0.0; 10], 16_000);
        assert_eq!(embedding.len(), EMBEDDING_DIM);
        assert!(embedding.0.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn similar_tones_are_more_similar_than_dissimilar_ones() {
        let tone_a: Vec<f32> = (0..32_000)
            .map(|i| (2.0 * std::f32::consts::PI * 200.0 * i as f32 / 16_000.0).sin())
            .collect();
        let tone_a2: Vec<f32> = (0..32_000)
            .map(|i| (2.0 * std::f32::consts::PI * 205.0 * i as f32 / 16_000.0).sin())
            .collect();
        let tone_b: Vec<f32> = (0..32_000)
            .map(|i| (2.0 * std::f32::consts::PI * 3000.0 * i as f32 / 16_000.0).sin())
            .collect();

        let ea = extract(&tone_a, 16_000);
        let ea2 = extract(&tone_a2, 16_000);
        let eb = extract(&tone_b, 16_000);

        assert!(ea.cosine_similarity(&ea2) > ea.cosine_similarity(&eb));
    }
}
