//! Batch Pipeline (§4.H): end-to-end processing of one complete audio blob,
//! backing the file-upload-adjacent endpoints listed in §6. The HTTP
//! handlers themselves are an external collaborator's concern (§1); this
//! module is the core logic they would call into.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audio::{codec, noise, quality};
use crate::audio::types::AudioMetadata;
use crate::speaker::registry::SharedSpeakerRegistry;
use crate::speaker::types::{EmbeddingWindow, Speaker, UNMATCHED_CONFIDENCE};
use crate::speaker::{diarizer, embedding};
use crate::transcription::{TranscriptSegment, TranscriptionBackend};

const DIARIZATION_WINDOW_S: f32 = 2.0;
const DIARIZATION_HOP_S: f32 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceProcessingResponse {
    pub id: Uuid,
    pub status: String,
    pub transcript: String,
    pub segments: Vec<TranscriptSegment>,
    pub speakers: Vec<Speaker>,
    pub metadata: AudioMetadata,
    pub confidence: f32,
    pub processing_time_s: f32,
    pub language_detected: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerIdentificationResult {
    pub speakers: Vec<Speaker>,
    pub total_speakers: usize,
    pub confidence: f32,
    pub processing_time_s: f32,
    pub method_used: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerTrainingResponse {
    pub speaker_id: String,
    pub name: String,
    pub status: String,
    pub accuracy_score: f32,
    pub samples_processed: u32,
}

/// Codec → Quality Assessor → (if SNR below threshold) Noise Suppressor →
/// Transcription Backend → response assembly.
pub async fn process_audio(
    bytes: &[u8],
    filename: Option<&str>,
    backend: &TranscriptionBackend,
    snr_threshold_db: f32,
) -> anyhow::Result<VoiceProcessingResponse> {
    let started = Instant::now();
    let (mut window, mut metadata) = codec::decode_and_resample(bytes, filename)?;

    let metrics = quality::assess(&window);
    metadata.quality_score = Some(metrics.clarity);
    metadata.noise_level = Some(metrics.snr_db);

    if metrics.snr_db < snr_threshold_db {
        match noise::reduce_noise(&window) {
            Ok(cleaned) => {
                let cleaned_metrics = quality::assess(&cleaned);
                metadata.noise_level = Some(cleaned_metrics.snr_db);
                window = cleaned;
            }
            Err(e) => {
                tracing::warn!(error = %e, "noise suppression failed, using original window");
            }
        }
    }

    let transcription = backend.transcribe(&window).await?;

    Ok(VoiceProcessingResponse {
        id: Uuid::new_v4(),
        status: "completed".to_string(),
        transcript: transcription.text,
        segments: transcription.segments,
        speakers: Vec::new(),
        metadata,
        confidence: transcription.confidence,
        processing_time_s: started.elapsed().as_secs_f32(),
        language_detected: transcription.language,
    })
}

/// Separate diarization path (§4.H): windows the blob at 2s/1s hop, extracts
/// an embedding per window, clusters, and matches clusters against the
/// registry (§4.F + §4.E).
pub async fn identify_speakers(
    bytes: &[u8],
    filename: Option<&str>,
    registry: &SharedSpeakerRegistry,
    match_threshold: f32,
) -> anyhow::Result<SpeakerIdentificationResult> {
    let started = Instant::now();
    let (window, _metadata) = codec::decode_and_resample(bytes, filename)?;

    let sample_rate = window.sample_rate_hz as f32;
    let window_len = (DIARIZATION_WINDOW_S * sample_rate) as usize;
    let hop_len = (DIARIZATION_HOP_S * sample_rate) as usize;

    let mut windows = Vec::new();
    let mut start = 0usize;
    while start + window_len <= window.samples.len() {
        let slice = &window.samples[start..start + window_len];
        windows.push(EmbeddingWindow {
            start_s: start as f32 / sample_rate,
            end_s: (start + window_len) as f32 / sample_rate,
            embedding: embedding::extract(slice, window.sample_rate_hz),
            samples: slice.to_vec(),
        });
        start += hop_len;
    }
    if windows.is_empty() && !window.samples.is_empty() {
        windows.push(EmbeddingWindow {
            start_s: 0.0,
            end_s: window.duration_seconds(),
            embedding: embedding::extract(&window.samples, window.sample_rate_hz),
            samples: window.samples.clone(),
        });
    }

    let clusters = diarizer::diarize(&windows);

    let mut speakers = Vec::with_capacity(clusters.len());
    let mut confidence_sum = 0.0f32;
    for cluster in &clusters {
        let (name, similarity) = registry.identify(&cluster.average_embedding, match_threshold);
        let confidence = if name.is_some() { similarity } else { UNMATCHED_CONFIDENCE };
        confidence_sum += confidence;
        speakers.push(Speaker {
            id: Uuid::new_v4().to_string(),
            name,
            confidence,
            segment_ids: cluster
                .window_indices
                .iter()
                .map(|i| i.to_string())
                .collect(),
            voice_characteristics: cluster.voice_characteristics,
        });
    }

    let confidence = if speakers.is_empty() {
        0.0
    } else {
        confidence_sum / speakers.len() as f32
    };

    Ok(SpeakerIdentificationResult {
        total_speakers: speakers.len(),
        speakers,
        confidence,
        processing_time_s: started.elapsed().as_secs_f32(),
        method_used: "agglomerative-silhouette",
    })
}

/// Decode, extract a whole-clip embedding, and persist it under `name` (§4.E train).
pub async fn train_speaker(
    name: &str,
    bytes: &[u8],
    filename: Option<&str>,
    registry: &SharedSpeakerRegistry,
) -> anyhow::Result<SpeakerTrainingResponse> {
    let (window, _metadata) = codec::decode_and_resample(bytes, filename)?;
    let extracted = embedding::extract(&window.samples, window.sample_rate_hz);
    let is_zero = extracted.0.iter().all(|&v| v == 0.0);

    registry.train(name, extracted).await?;

    Ok(SpeakerTrainingResponse {
        speaker_id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        status: "trained".to_string(),
        accuracy_score: if is_zero { 0.0 } else { 1.0 },
        samples_processed: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn wav_bytes(sample_rate: u32, duration_s: f32, freq: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let n = (sample_rate as f32 * duration_s) as usize;
            for i in 0..n {
                let t = i as f32 / sample_rate as f32;
                let sample = (2.0 * std::f32::consts::PI * freq * t).sin() * 0.8;
                writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[tokio::test]
    async fn process_audio_runs_end_to_end_with_the_fallback_backend() {
        let bytes = wav_bytes(16_000, 2.0, 220.0);
        let backend = TranscriptionBackend::Fallback;
        let response = process_audio(&bytes, Some("clip.wav"), &backend, 10.0)
            .await
            .unwrap();
        assert_eq!(response.status, "completed");
        assert!(response.metadata.duration_seconds > 0.0);
    }

    #[tokio::test]
    async fn known_speaker_is_identified_above_threshold() {
        let dir = TempDir::new().unwrap();
        let registry: SharedSpeakerRegistry =
            std::sync::Arc::new(crate::speaker::SpeakerRegistry::load(dir.path()).await.unwrap());

        let training_clip = wav_bytes(16_000, 3.0, 180.0);
        train_speaker("alice", &training_clip, Some("alice.wav"), &registry)
            .await
            .unwrap();

        let result = identify_speakers(&training_clip, Some("alice.wav"), &registry, 0.7)
            .await
            .unwrap();
        assert_eq!(result.total_speakers, 1);
        assert_eq!(result.speakers[0].name.as_deref(), Some("alice"));
        assert!(result.speakers[0].confidence >= 0.7);
    }

    #[tokio::test]
    async fn unknown_speaker_falls_back_to_default_confidence() {
        let dir = TempDir::new().unwrap();
        let registry: SharedSpeakerRegistry =
            std::sync::Arc::new(crate::speaker::SpeakerRegistry::load(dir.path()).await.unwrap());

        let clip = wav_bytes(16_000, 3.0, 300.0);
        let result = identify_speakers(&clip, Some("clip.wav"), &registry, 0.7)
            .await
            .unwrap();
        for speaker in &result.speakers {
            assert!(speaker.name.is_none());
            assert_eq!(speaker.confidence, UNMATCHED_CONFIDENCE);
        }
    }
}
