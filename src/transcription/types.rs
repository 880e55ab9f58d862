//! Transcript value types and the transcription backend error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: String,
    pub text: String,
    pub start_time: f32,
    pub end_time: f32,
    pub speaker: Option<String>,
    pub confidence: f32,
    pub language: Option<String>,
}

/// Output of a transcription backend call (§4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub confidence: f32,
    pub language: Option<String>,
}

#[derive(Debug, Error)]
pub enum ASRError {
    #[error("remote transcription backend unavailable: {message}")]
    BackendUnavailable { message: String },

    #[error("local model not loaded: {message}")]
    ModelNotLoaded { message: String },

    #[error("transcription request failed: {message}")]
    RequestFailed { message: String },
}
