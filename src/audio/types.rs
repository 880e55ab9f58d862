//! Core audio value types and the codec's error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CANONICAL_SAMPLE_RATE_HZ: u32 = 16_000;
pub const CANONICAL_CHANNELS: u16 = 1;
pub const CANONICAL_BIT_DEPTH: u16 = 16;

/// Container format detected from a file-upload blob (§4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Wav,
    Mp3,
    Flac,
    Ogg,
}

impl ContainerFormat {
    /// Detect from a filename extension, falling back to a leading-bytes
    /// signature sniff, defaulting to WAV when neither is conclusive —
    /// exactly the precedence used by the source this is ported from.
    pub fn detect(filename: Option<&str>, bytes: &[u8]) -> Self {
        if let Some(name) = filename {
            if let Some(ext) = name.rsplit('.').next() {
                match ext.to_ascii_lowercase().as_str() {
                    "wav" => return ContainerFormat::Wav,
                    "mp3" => return ContainerFormat::Mp3,
                    "flac" => return ContainerFormat::Flac,
                    "ogg" => return ContainerFormat::Ogg,
                    _ => {}
                }
            }
        }
        Self::sniff(bytes)
    }

    fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"RIFF") {
            ContainerFormat::Wav
        } else if bytes.starts_with(b"ID3") || bytes.starts_with(&[0xFF, 0xFB]) {
            ContainerFormat::Mp3
        } else if bytes.starts_with(b"fLaC") {
            ContainerFormat::Flac
        } else if bytes.starts_with(b"OggS") {
            ContainerFormat::Ogg
        } else {
            ContainerFormat::Wav
        }
    }
}

/// A canonical-format PCM buffer: 16 kHz / 1 channel / 16-bit signed, produced
/// by the Codec and immutable thereafter (§3).
#[derive(Debug, Clone)]
pub struct AudioWindow {
    /// Samples normalized to `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl AudioWindow {
    pub fn is_canonical(&self) -> bool {
        self.sample_rate_hz == CANONICAL_SAMPLE_RATE_HZ
            && self.channels == CANONICAL_CHANNELS
            && self.bit_depth == CANONICAL_BIT_DEPTH
    }

    pub fn duration_seconds(&self) -> f32 {
        self.samples.len() as f32 / (self.sample_rate_hz.max(1) * self.channels.max(1) as u32) as f32
    }

    /// Serialize back to little-endian 16-bit PCM bytes.
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 2);
        for &s in &self.samples {
            let clamped = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            out.extend_from_slice(&clamped.to_le_bytes());
        }
        out
    }

    /// Build a window directly from little-endian 16-bit PCM bytes already at
    /// the canonical rate/channel count — the streaming ingest path (§4.I.1).
    pub fn from_canonical_pcm(bytes: &[u8]) -> Self {
        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / i16::MAX as f32)
            .collect();
        Self {
            samples,
            sample_rate_hz: CANONICAL_SAMPLE_RATE_HZ,
            channels: CANONICAL_CHANNELS,
            bit_depth: CANONICAL_BIT_DEPTH,
        }
    }
}

/// Attached to every processed blob (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub duration_seconds: f32,
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub original_format: ContainerFormat,
    pub byte_size: usize,
    pub quality_score: Option<f32>,
    pub noise_level: Option<f32>,
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("unsupported audio format: {format:?}")]
    UnsupportedFormat { format: ContainerFormat },

    #[error("failed to decode audio: {message}")]
    DecodeError { message: String },

    #[error("audio processing failed: {message}")]
    ProcessingFailed { message: String },
}
