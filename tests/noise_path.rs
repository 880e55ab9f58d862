//! Conditional noise reduction path in the Batch Pipeline (§4.B/§4.C): a
//! noisy clip below the configured SNR threshold should still process to
//! completion via the noise-suppressed window.

use std::io::Cursor;

use auris_core::pipeline;
use auris_core::transcription::TranscriptionBackend;

fn noisy_wav() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let mut state = 987654321u32;
        for _ in 0..32_000 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let sample = (state as f32 / u32::MAX as f32) * 2.0 - 1.0;
            writer.write_sample((sample * i16::MAX as f32 * 0.3) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

#[tokio::test]
async fn a_noisy_clip_with_a_high_snr_threshold_still_completes() {
    let bytes = noisy_wav();
    let backend = TranscriptionBackend::Fallback;

    // A high threshold forces every window through the noise suppressor.
    let response = pipeline::process_audio(&bytes, Some("noisy.wav"), &backend, 100.0)
        .await
        .expect("noise path should not fail the pipeline");

    assert_eq!(response.status, "completed");
    assert!(response.metadata.noise_level.is_some());
}

#[tokio::test]
async fn a_clean_clip_with_a_low_snr_threshold_skips_noise_reduction() {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..32_000 {
            let t = i as f32 / 16_000.0;
            let sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.8;
            writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    let bytes = cursor.into_inner();
    let backend = TranscriptionBackend::Fallback;

    let response = pipeline::process_audio(&bytes, Some("clean.wav"), &backend, -100.0)
        .await
        .expect("clean path should not fail the pipeline");

    assert_eq!(response.status, "completed");
}
