//! Backpressure (§8 Scenario 4): chunks arriving faster than they can be
//! windowed must still yield updates in non-decreasing timestamp order, with
//! at most one window in flight at a time.

use std::sync::Arc;
use std::time::Duration;

use auris_core::config::SessionConfig;
use auris_core::connection::ConnectionManager;
use auris_core::speaker::SpeakerRegistry;
use auris_core::store::InMemorySessionStore;
use auris_core::transcription::BackendSet;
use auris_core::wire::ServerMessage;
use tempfile::TempDir;

#[tokio::test]
async fn updates_arrive_in_non_decreasing_timestamp_order_under_fast_chunk_arrival() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(SpeakerRegistry::load(dir.path()).await.unwrap());
    let manager = ConnectionManager::new(
        registry,
        Arc::new(BackendSet::new(None, None)),
        Arc::new(InMemorySessionStore::new()),
    );

    let config = SessionConfig::default();
    let (handle, mut outbound) = manager.register(config.clone());

    // Ten windows' worth of chunks, fired back-to-back with no pacing.
    let full_window = vec![0u8; config.chunk_size_bytes()];
    for _ in 0..10 {
        manager.route_chunk(handle.client_id, full_window.clone());
    }

    let mut last_timestamp = None;
    let mut received = 0;
    while received < 3 {
        let message = tokio::time::timeout(Duration::from_secs(5), outbound.recv())
            .await
            .expect("updates should keep arriving")
            .expect("outbound channel should stay open");

        if let ServerMessage::TranscriptUpdate(update) = message {
            if let Some(prev) = last_timestamp {
                assert!(update.timestamp >= prev, "updates must not arrive out of order");
            }
            last_timestamp = Some(update.timestamp);
            received += 1;
        }
    }
}
