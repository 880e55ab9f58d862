//! End-to-end streaming session lifecycle through the Connection Manager:
//! register, push a full window, receive a transcript update, close.

use std::sync::Arc;
use std::time::Duration;

use auris_core::config::SessionConfig;
use auris_core::connection::ConnectionManager;
use auris_core::speaker::SpeakerRegistry;
use auris_core::store::{InMemorySessionStore, SessionStore};
use auris_core::transcription::BackendSet;
use auris_core::wire::ServerMessage;
use tempfile::TempDir;

async fn fresh_manager() -> Arc<ConnectionManager> {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(SpeakerRegistry::load(dir.path()).await.unwrap());
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    ConnectionManager::new(registry, Arc::new(BackendSet::new(None, None)), store)
}

#[tokio::test]
async fn a_full_window_produces_a_transcript_update_and_persists_it() {
    let manager = fresh_manager().await;
    let config = SessionConfig::default();
    let (handle, mut outbound) = manager.register(config.clone());

    let chunk = vec![0u8; config.chunk_size_bytes()];
    assert!(manager.route_chunk(handle.client_id, chunk));

    let message = tokio::time::timeout(Duration::from_secs(2), outbound.recv())
        .await
        .expect("update should arrive before the timeout")
        .expect("outbound channel should still be open");

    match message {
        ServerMessage::TranscriptUpdate(update) => {
            assert_eq!(update.session_id, handle.session_id);
            assert!(update.is_final);
        }
        other => panic!("expected a transcript update, got something else: {other:?}"),
    }
}

#[tokio::test]
async fn closing_a_session_removes_it_from_the_active_map() {
    let manager = fresh_manager().await;
    let (handle, _outbound) = manager.register(SessionConfig::default());

    assert_eq!(manager.active_connection_count(), 1);
    manager.close(handle.client_id);
    assert_eq!(manager.active_connection_count(), 0);
}

#[tokio::test]
async fn partial_chunks_below_the_window_size_do_not_trigger_processing() {
    let manager = fresh_manager().await;
    let config = SessionConfig::default();
    let (handle, mut outbound) = manager.register(config.clone());

    let half_chunk = vec![0u8; config.chunk_size_bytes() / 2];
    manager.route_chunk(handle.client_id, half_chunk);

    let result = tokio::time::timeout(Duration::from_millis(200), outbound.recv()).await;
    assert!(result.is_err(), "no update should be emitted for a partial window");
}
