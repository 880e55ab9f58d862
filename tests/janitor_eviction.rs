//! Janitor eviction of idle sessions (Connection Manager).

use std::sync::Arc;
use std::time::Duration;

use auris_core::config::SessionConfig;
use auris_core::connection::ConnectionManager;
use auris_core::speaker::SpeakerRegistry;
use auris_core::store::InMemorySessionStore;
use auris_core::transcription::BackendSet;
use tempfile::TempDir;

#[tokio::test]
async fn idle_session_is_evicted_by_a_running_janitor_tick() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(SpeakerRegistry::load(dir.path()).await.unwrap());
    let manager = ConnectionManager::new(
        registry,
        Arc::new(BackendSet::new(None, None)),
        Arc::new(InMemorySessionStore::new()),
    );

    let mut config = SessionConfig::default();
    config.session_idle_timeout_s = 0;
    let (_handle, _outbound) = manager.register(config);
    assert_eq!(manager.active_connection_count(), 1);

    let janitor = tokio::spawn(manager.clone().run_janitor(Duration::from_millis(20)));

    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if manager.active_connection_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("janitor should evict the idle session before the timeout");

    assert_eq!(manager.eviction_count(), 1);
    janitor.abort();
}

#[tokio::test]
async fn active_sessions_below_the_idle_threshold_survive_a_sweep() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(SpeakerRegistry::load(dir.path()).await.unwrap());
    let manager = ConnectionManager::new(
        registry,
        Arc::new(BackendSet::new(None, None)),
        Arc::new(InMemorySessionStore::new()),
    );

    let mut config = SessionConfig::default();
    config.session_idle_timeout_s = 300;
    manager.register(config);

    let janitor = tokio::spawn(manager.clone().run_janitor(Duration::from_millis(10)));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(manager.active_connection_count(), 1);
    janitor.abort();
}
