//! Session Store (§4.J): durable append log of transcript updates keyed by
//! session id, with TTL semantics.
//!
//! The original source talks to Redis (`lpush`/`lrange`/`expire`); no Redis
//! client appears anywhere in the donor's or the wider pack's dependency
//! stack, so rather than fabricate one this is expressed as a trait —
//! `SessionStore` — matching the "global singletons → injected collaborators"
//! design note, with an in-process implementation good enough to exercise the
//! contract end to end. A real deployment swaps in a Redis- or
//! similarly-backed implementation without touching any caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use crate::session::types::TranscriptUpdate;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append a serialized update onto the list at `key`.
    async fn append(&self, key: &str, update: &TranscriptUpdate) -> Result<(), StoreError>;

    /// Return every entry at `key` in append order.
    async fn get_range(&self, key: &str) -> Result<Vec<TranscriptUpdate>, StoreError>;

    /// Set a TTL, in seconds, on `key`.
    async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError>;
}

struct ListEntry {
    values: Vec<TranscriptUpdate>,
    expires_at: Option<Instant>,
}

/// In-process implementation of the append/range/expire contract. Entries
/// past their TTL are swept lazily on access rather than via a background
/// task, since nothing here needs wall-clock precision beyond "eventually".
pub struct InMemorySessionStore {
    lists: RwLock<HashMap<String, ListEntry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            lists: RwLock::new(HashMap::new()),
        }
    }

    fn is_expired(entry: &ListEntry) -> bool {
        matches!(entry.expires_at, Some(at) if Instant::now() >= at)
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append(&self, key: &str, update: &TranscriptUpdate) -> Result<(), StoreError> {
        let mut lists = self.lists.write().await;
        let entry = lists.entry(key.to_string()).or_insert_with(|| ListEntry {
            values: Vec::new(),
            expires_at: None,
        });
        if Self::is_expired(entry) {
            entry.values.clear();
            entry.expires_at = None;
        }
        entry.values.push(update.clone());
        Ok(())
    }

    async fn get_range(&self, key: &str) -> Result<Vec<TranscriptUpdate>, StoreError> {
        let lists = self.lists.read().await;
        match lists.get(key) {
            Some(entry) if !Self::is_expired(entry) => Ok(entry.values.clone()),
            _ => Ok(Vec::new()),
        }
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError> {
        let mut lists = self.lists.write().await;
        if let Some(entry) = lists.get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
        }
        Ok(())
    }
}

/// Append then set the default TTL, logging (but not failing the caller on)
/// store unavailability — §4.J: "loss of persistence is logged but non-fatal".
pub async fn persist_update(
    store: &Arc<dyn SessionStore>,
    key: &str,
    update: &TranscriptUpdate,
    ttl_s: u64,
) {
    if let Err(e) = store.append(key, update).await {
        warn!(error = %e, key, "failed to append transcript update to session store");
        return;
    }
    if let Err(e) = store.expire(key, ttl_s).await {
        warn!(error = %e, key, "failed to set session store TTL");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::store_key;
    use chrono::Utc;
    use uuid::Uuid;

    fn update(session_id: Uuid, text: &str) -> TranscriptUpdate {
        TranscriptUpdate {
            session_id,
            chunk_id: "chunk_1".to_string(),
            text: text.to_string(),
            is_final: true,
            confidence: 0.8,
            speaker: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_then_get_range_preserves_order() {
        let store = InMemorySessionStore::new();
        let session_id = Uuid::new_v4();
        let key = store_key(session_id);

        store.append(&key, &update(session_id, "first")).await.unwrap();
        store.append(&key, &update(session_id, "second")).await.unwrap();

        let values = store.get_range(&key).await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].text, "first");
        assert_eq!(values[1].text, "second");
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_on_next_access() {
        let store = InMemorySessionStore::new();
        let session_id = Uuid::new_v4();
        let key = store_key(session_id);

        store.append(&key, &update(session_id, "stale")).await.unwrap();
        store.expire(&key, 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let values = store.get_range(&key).await.unwrap();
        assert!(values.is_empty());
    }
}
