//! Connection Manager (§4.K): owns the map of live client connections,
//! routes inbound chunks to the right session, and runs the janitor that
//! evicts idle sessions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::session::{self, SessionCollaborators, SessionCommand, SessionHandle};
use crate::speaker::registry::SharedSpeakerRegistry;
use crate::store::SessionStore;
use crate::transcription::BackendSet;
use crate::wire::ServerMessage;

pub struct ConnectionManager {
    sessions: DashMap<Uuid, SessionHandle>,
    registry: SharedSpeakerRegistry,
    backend: Arc<BackendSet>,
    store: Arc<dyn SessionStore>,
    evictions: AtomicUsize,
    in_flight_processing: Arc<AtomicUsize>,
}

impl ConnectionManager {
    pub fn new(
        registry: SharedSpeakerRegistry,
        backend: Arc<BackendSet>,
        store: Arc<dyn SessionStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            registry,
            backend,
            store,
            evictions: AtomicUsize::new(0),
            in_flight_processing: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Register a new connection: assigns client/session ids, spawns the
    /// backing actor, and returns the handle plus its outbound stream for
    /// the transport layer to drain onto the socket.
    pub fn register(&self, config: SessionConfig) -> (SessionHandle, mpsc::UnboundedReceiver<ServerMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let collaborators = SessionCollaborators {
            registry: self.registry.clone(),
            backend: self.backend.clone(),
            store: self.store.clone(),
            outbound: outbound_tx,
            in_flight: self.in_flight_processing.clone(),
        };
        let handle = session::spawn(config, collaborators);
        self.sessions.insert(handle.client_id, handle.clone());
        info!(client_id = %handle.client_id, session_id = %handle.session_id, "connection established");
        (handle, outbound_rx)
    }

    /// Route a raw PCM chunk to its session. Returns `false` if the client
    /// is unknown (already evicted or never registered).
    pub fn route_chunk(&self, client_id: Uuid, bytes: Vec<u8>) -> bool {
        match self.sessions.get(&client_id) {
            Some(handle) => {
                handle.touch();
                handle.commands.send(SessionCommand::Chunk(bytes)).is_ok()
            }
            None => false,
        }
    }

    pub fn route_config_update(&self, client_id: Uuid, config: SessionConfig) -> bool {
        match self.sessions.get(&client_id) {
            Some(handle) => handle.commands.send(SessionCommand::UpdateConfig(config)).is_ok(),
            None => false,
        }
    }

    /// Graceful close (§4.I): the actor finishes draining, then the
    /// Connection Manager removes it from the active map.
    pub fn close(&self, client_id: Uuid) {
        if let Some((_, handle)) = self.sessions.remove(&client_id) {
            let _ = handle.commands.send(SessionCommand::Close);
        }
    }

    /// Hard disconnect (§4.K / §5): cancel in-flight work immediately and
    /// drop the session from the active map so its buffer is cleared.
    pub fn disconnect(&self, client_id: Uuid) {
        if let Some((_, handle)) = self.sessions.remove(&client_id) {
            let _ = handle.commands.send(SessionCommand::Cancel);
        }
    }

    pub fn active_connection_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn eviction_count(&self) -> usize {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Snapshot of windows currently being transcribed/diarized across every
    /// active session, mirroring the reference janitor's `processing_tasks`
    /// log field (§4.K).
    pub fn in_flight_processing_count(&self) -> usize {
        self.in_flight_processing.load(Ordering::Relaxed)
    }

    /// One eviction sweep: any session idle past its configured threshold
    /// is cancelled and removed. Returns how many were evicted.
    fn sweep_idle_sessions(&self) -> usize {
        let stale: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_idle())
            .map(|entry| *entry.key())
            .collect();

        for client_id in &stale {
            if let Some((_, handle)) = self.sessions.remove(client_id) {
                let _ = handle.commands.send(SessionCommand::Cancel);
                info!(client_id = %client_id, "janitor evicted idle session");
            }
        }
        self.evictions.fetch_add(stale.len(), Ordering::Relaxed);
        stale.len()
    }

    /// Run the janitor loop on the given tick period until the manager is
    /// dropped (§4.K). Intended to be `tokio::spawn`ed once at startup.
    pub async fn run_janitor(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = self.sweep_idle_sessions();
            if evicted > 0 {
                info!(
                    evicted,
                    processing_tasks = self.in_flight_processing_count(),
                    "janitor sweep complete"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySessionStore;
    use tempfile::TempDir;

    async fn manager() -> Arc<ConnectionManager> {
        let dir = TempDir::new().unwrap();
        let registry: SharedSpeakerRegistry =
            Arc::new(crate::speaker::SpeakerRegistry::load(dir.path()).await.unwrap());
        ConnectionManager::new(
            registry,
            Arc::new(BackendSet::new(None, None)),
            Arc::new(InMemorySessionStore::new()),
        )
    }

    #[tokio::test]
    async fn register_adds_one_active_connection() {
        let manager = manager().await;
        let (handle, _rx) = manager.register(SessionConfig::default());
        assert_eq!(manager.active_connection_count(), 1);
        assert!(manager.sessions.contains_key(&handle.client_id));
    }

    #[tokio::test]
    async fn disconnect_removes_the_session_from_the_active_map() {
        let manager = manager().await;
        let (handle, _rx) = manager.register(SessionConfig::default());
        manager.disconnect(handle.client_id);
        assert_eq!(manager.active_connection_count(), 0);
    }

    #[tokio::test]
    async fn route_chunk_to_unknown_client_reports_failure() {
        let manager = manager().await;
        assert!(!manager.route_chunk(Uuid::new_v4(), vec![0; 10]));
    }

    #[tokio::test]
    async fn in_flight_processing_count_starts_at_zero() {
        let manager = manager().await;
        let (_handle, _rx) = manager.register(SessionConfig::default());
        assert_eq!(manager.in_flight_processing_count(), 0);
    }

    #[tokio::test]
    async fn janitor_sweep_evicts_sessions_idle_past_their_threshold() {
        let manager = manager().await;
        let mut config = SessionConfig::default();
        config.session_idle_timeout_s = 0;
        let (_handle, _rx) = manager.register(config);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let evicted = manager.sweep_idle_sessions();

        assert_eq!(evicted, 1);
        assert_eq!(manager.active_connection_count(), 0);
        assert_eq!(manager.eviction_count(), 1);
    }
}
