//! Shared speaker-domain types (§3): embeddings, registry records, clusters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dimensionality of the reference extractor's embedding: 13 MFCCs, each
/// contributing a mean and std, plus 13 mean delta-MFCCs (§4.D).
pub const EMBEDDING_DIM: usize = 39;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn zero() -> Self {
        Embedding(vec![0.0; EMBEDDING_DIM])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Cosine similarity. Returns 0.0 for zero-length or mismatched vectors
    /// rather than panicking or dividing by zero (§3 invariant: mismatched
    /// dimensions fail fast upstream, but comparison itself stays total).
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.0.is_empty() || other.0.is_empty() || self.0.len() != other.0.len() {
            return 0.0;
        }
        let dot: f32 = self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum();
        let norm_a: f32 = self.0.iter().map(|v| v * v).sum::<f32>().sqrt();
        let norm_b: f32 = other.0.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

/// A trained speaker, persisted as one binary record per name (§4.E / §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerRecord {
    pub name: String,
    pub embedding: Embedding,
    pub created_at: DateTime<Utc>,
    pub sample_count: u32,
}

/// Voice-characteristics summary attached to a diarized cluster (SPEC_FULL §10.5),
/// reproducing the reference implementation's crude-but-faithful approximations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoiceCharacteristics {
    pub average_pitch: f32,
    pub pitch_variance: f32,
    pub speaking_rate: f32,
    pub volume_level: f32,
    pub total_speaking_time: f32,
}

/// One window's worth of speaker-relevant data, as fed into the diarizer (§4.F).
#[derive(Debug, Clone)]
pub struct EmbeddingWindow {
    pub start_s: f32,
    pub end_s: f32,
    pub embedding: Embedding,
    pub samples: Vec<f32>,
}

/// Output of the diarizer: one contiguous speaker cluster (§3).
#[derive(Debug, Clone)]
pub struct DiarizedCluster {
    pub cluster_id: usize,
    pub window_indices: Vec<usize>,
    pub average_embedding: Embedding,
    pub voice_characteristics: VoiceCharacteristics,
}

/// A named-or-anonymous speaker attached to output segments (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Speaker {
    pub id: String,
    pub name: Option<String>,
    pub confidence: f32,
    pub segment_ids: Vec<String>,
    pub voice_characteristics: VoiceCharacteristics,
}

/// Similarity below which a diarized cluster is reported unnamed, with the
/// fallback confidence from §3's invariant.
pub const UNMATCHED_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("io error persisting speaker record: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize speaker record: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("speaker not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum DiarizationError {
    #[error("insufficient embeddings to cluster: need at least {needed}, got {got}")]
    InsufficientEmbeddings { needed: usize, got: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
