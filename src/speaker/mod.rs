//! Embedding Extractor, Speaker Registry, and Diarizer (§4.D–F).

pub mod diarizer;
pub mod embedding;
pub mod registry;
pub mod types;

pub use registry::SpeakerRegistry;
pub use types::{DiarizedCluster, Embedding, RegistryError, SpeakerRecord};
