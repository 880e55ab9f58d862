//! Transcription Backend (§4.G): the pluggable remote/local/fallback variant.

pub mod backend;
pub mod types;

pub use backend::{BackendSet, TranscriptionBackend, QUICK_PATH_PREFERS_FALLBACK};
pub use types::{ASRError, TranscriptSegment, TranscriptionResult};
