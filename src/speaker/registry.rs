//! Speaker Registry (§4.E): in-memory map of name → embedding with a disk
//! mirror, one binary record per speaker name, in a configured directory.
//!
//! Follows the "single writer, read-many" design note: mutations write disk
//! first, then update the in-memory map; readers take a snapshot via
//! `dashmap`'s lock-free reads rather than holding any registry-wide lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::speaker::types::{Embedding, RegistryError, SpeakerRecord};

pub struct SpeakerRegistry {
    dir: PathBuf,
    records: DashMap<String, SpeakerRecord>,
    /// Serializes writers; readers never take this lock.
    write_lock: Mutex<()>,
}

impl SpeakerRegistry {
    /// Load every persisted record from `dir`, creating it if absent.
    /// Records whose embedding dimension doesn't match the first record
    /// loaded are logged and skipped rather than failing startup.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let records = DashMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut expected_dim: Option<usize> = None;
        let mut loaded = 0usize;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bin") {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(b) => b,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read speaker record, skipping");
                    continue;
                }
            };
            let record: SpeakerRecord = match bincode::deserialize(&bytes) {
                Ok(r) => r,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to decode speaker record, skipping");
                    continue;
                }
            };
            let dim = record.embedding.len();
            match expected_dim {
                None => expected_dim = Some(dim),
                Some(expected) if expected != dim => {
                    warn!(
                        name = %record.name,
                        expected,
                        got = dim,
                        "speaker record dimension mismatch on load, skipping"
                    );
                    continue;
                }
                _ => {}
            }
            records.insert(record.name.clone(), record);
            loaded += 1;
        }

        info!(loaded, dir = %dir.display(), "speaker registry loaded");

        Ok(Self {
            dir,
            records,
            write_lock: Mutex::new(()),
        })
    }

    /// Store a trained embedding for `name`, writing disk before updating the
    /// in-memory map.
    pub async fn train(&self, name: &str, embedding: Embedding) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;

        let record = SpeakerRecord {
            name: name.to_string(),
            embedding,
            created_at: Utc::now(),
            sample_count: self
                .records
                .get(name)
                .map(|r| r.sample_count + 1)
                .unwrap_or(1),
        };

        let bytes = bincode::serialize(&record)?;
        let path = self.record_path(name);
        tokio::fs::write(&path, bytes).await?;

        self.records.insert(name.to_string(), record);
        Ok(())
    }

    /// Best match against every stored record. Returns `(name, similarity)`
    /// only when similarity exceeds `threshold`; otherwise `(None, best_similarity)`.
    pub fn identify(&self, embedding: &Embedding, threshold: f32) -> (Option<String>, f32) {
        let mut best_name: Option<String> = None;
        let mut best_similarity = 0.0f32;

        for entry in self.records.iter() {
            let similarity = entry.value().embedding.cosine_similarity(embedding);
            if similarity > best_similarity {
                best_similarity = similarity;
                best_name = Some(entry.key().clone());
            }
        }

        if best_similarity > threshold {
            (best_name, best_similarity)
        } else {
            (None, best_similarity)
        }
    }

    pub fn list(&self) -> Vec<String> {
        self.records.iter().map(|e| e.key().clone()).collect()
    }

    pub async fn delete(&self, name: &str) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().await;

        if self.records.remove(name).is_none() {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        let path = self.record_path(name);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.bin"))
    }
}

pub type SharedSpeakerRegistry = Arc<SpeakerRegistry>;
