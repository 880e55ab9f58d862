//! Streaming Session (§4.I): the per-client actor. Runs as its own tokio
//! task with an input queue of commands and an internal single-processing-
//! slot gate — §9's "async coroutines → actor-per-session" design note.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::types::AudioWindow;
use crate::config::SessionConfig;
use crate::session::types::{store_key, SessionMeta, SessionState, TranscriptUpdate, SESSION_STORE_TTL_S};
use crate::speaker::registry::SharedSpeakerRegistry;
use crate::store::{persist_update, SessionStore};
use crate::transcription::BackendSet;
use crate::wire::ServerMessage;

/// Commands accepted by a running session actor.
pub enum SessionCommand {
    /// A raw PCM chunk arriving from the client.
    Chunk(Vec<u8>),
    /// A client-sent config update (the `{type:"config",...}` envelope).
    UpdateConfig(SessionConfig),
    /// Graceful close: finish any in-flight window, then terminate (§4.I Draining).
    Close,
    /// Hard disconnect or idle-timeout eviction: cancel in-flight work immediately (§5).
    Cancel,
}

/// A cheaply-cloneable reference to a running session, held by the
/// Connection Manager's client map.
#[derive(Clone)]
pub struct SessionHandle {
    pub client_id: Uuid,
    pub session_id: Uuid,
    pub commands: mpsc::UnboundedSender<SessionCommand>,
    /// This session's configured idle threshold, snapshotted at spawn time
    /// so the janitor can evict without re-reading a moving `SessionConfig`.
    pub idle_timeout: Duration,
    last_activity_millis: Arc<AtomicI64>,
}

impl SessionHandle {
    pub fn touch(&self) {
        self.last_activity_millis
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        let last = self.last_activity_millis.load(Ordering::Relaxed);
        let now = Utc::now().timestamp_millis();
        Duration::from_millis((now - last).max(0) as u64)
    }

    pub fn is_idle(&self) -> bool {
        self.idle_for() >= self.idle_timeout
    }
}

pub struct SessionCollaborators {
    pub registry: SharedSpeakerRegistry,
    pub backend: Arc<BackendSet>,
    pub store: Arc<dyn SessionStore>,
    pub outbound: mpsc::UnboundedSender<ServerMessage>,
    /// Shared with the Connection Manager so it can report how many windows
    /// are processing right now, across every session (§4.K).
    pub in_flight: Arc<AtomicUsize>,
}

struct SessionActor {
    meta: SessionMeta,
    state: SessionState,
    pending_chunks: Vec<Vec<u8>>,
    collaborators: SessionCollaborators,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    last_activity: Arc<AtomicI64>,
}

/// Spawn a new session actor and return a handle to it plus the client/session
/// ids the Connection Manager should register (§4.K).
pub fn spawn(config: SessionConfig, collaborators: SessionCollaborators) -> SessionHandle {
    let client_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    let last_activity = Arc::new(AtomicI64::new(Utc::now().timestamp_millis()));
    let idle_timeout = Duration::from_secs(config.session_idle_timeout_s);

    let actor = SessionActor {
        meta: SessionMeta {
            client_id,
            session_id,
            connected_at: Utc::now(),
            config,
        },
        state: SessionState::Registered,
        pending_chunks: Vec::new(),
        collaborators,
        commands: rx,
        last_activity: last_activity.clone(),
    };

    tokio::spawn(actor.run());

    SessionHandle {
        client_id,
        session_id,
        commands: tx,
        idle_timeout,
        last_activity_millis: last_activity,
    }
}

impl SessionActor {
    async fn run(mut self) {
        info!(session_id = %self.meta.session_id, client_id = %self.meta.client_id, "session registered");

        let mut processing: Option<JoinHandle<TranscriptUpdate>> = None;
        let mut draining = false;

        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(SessionCommand::Chunk(bytes)) => {
                            self.touch();
                            self.pending_chunks.push(bytes);
                            self.state = SessionState::Buffering;

                            let buffered_len: usize = self.pending_chunks.iter().map(Vec::len).sum();
                            if processing.is_none() && buffered_len >= self.meta.config.chunk_size_bytes() {
                                processing = Some(self.spawn_window_processing());
                                self.state = SessionState::Processing;
                            }
                        }
                        Some(SessionCommand::UpdateConfig(new_config)) => {
                            self.meta.config = new_config.clone();
                            let _ = self.collaborators.outbound.send(ServerMessage::ConfigUpdated { config: new_config });
                        }
                        Some(SessionCommand::Close) => {
                            if processing.is_some() {
                                draining = true;
                                self.state = SessionState::Draining;
                            } else {
                                break;
                            }
                        }
                        Some(SessionCommand::Cancel) => {
                            if let Some(handle) = processing.take() {
                                handle.abort();
                                self.collaborators.in_flight.fetch_sub(1, Ordering::Relaxed);
                                warn!(session_id = %self.meta.session_id, "cancelled in-flight processing on disconnect/idle-timeout");
                            }
                            break;
                        }
                        None => break,
                    }
                }
                result = wait_for(&mut processing) => {
                    processing = None;
                    self.collaborators.in_flight.fetch_sub(1, Ordering::Relaxed);
                    if let Ok(update) = result {
                        self.emit_and_persist(update).await;
                    }
                    if draining {
                        break;
                    }
                    self.state = SessionState::Buffering;
                }
            }
        }

        self.state = SessionState::Terminated;
        info!(session_id = %self.meta.session_id, "session terminated");
    }

    fn touch(&self) {
        self.last_activity
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Windowing policy (§4.I): concatenate all pending chunks, then clear
    /// the buffer retaining only the last chunk as overlap context when two
    /// or more chunks were pending.
    fn take_window_bytes(&mut self) -> Vec<u8> {
        let concatenated: Vec<u8> = self.pending_chunks.concat();
        let had_multiple = self.pending_chunks.len() >= 2;
        self.pending_chunks = if had_multiple {
            vec![self.pending_chunks.last().cloned().unwrap_or_default()]
        } else {
            Vec::new()
        };
        concatenated
    }

    fn spawn_window_processing(&mut self) -> JoinHandle<TranscriptUpdate> {
        let bytes = self.take_window_bytes();
        let session_id = self.meta.session_id;
        let config = self.meta.config.clone();
        let registry = self.collaborators.registry.clone();
        let backend = self.collaborators.backend.clone();
        self.collaborators.in_flight.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move { process_window(session_id, bytes, config, registry, backend).await })
    }

    async fn emit_and_persist(&self, update: TranscriptUpdate) {
        if self.collaborators.outbound.send(ServerMessage::TranscriptUpdate(update.clone())).is_err() {
            debug!(session_id = %self.meta.session_id, "outbound channel closed, client already gone");
        }
        persist_update(
            &self.collaborators.store,
            &store_key(self.meta.session_id),
            &update,
            SESSION_STORE_TTL_S,
        )
        .await;
    }
}

async fn wait_for(handle: &mut Option<JoinHandle<TranscriptUpdate>>) -> Result<TranscriptUpdate, tokio::task::JoinError> {
    match handle {
        Some(h) => h.await,
        None => std::future::pending().await,
    }
}

/// Per-window processing (§4.I steps 1–4): build the canonical window,
/// quick-transcribe, optionally identify the speaker, assemble the update.
/// Any failure here yields an empty-text, zero-confidence update rather than
/// propagating — the stream is never closed because of it (§4.I step 6).
async fn process_window(
    session_id: Uuid,
    bytes: Vec<u8>,
    config: SessionConfig,
    registry: SharedSpeakerRegistry,
    backend: Arc<BackendSet>,
) -> TranscriptUpdate {
    let window = AudioWindow::from_canonical_pcm(&bytes);
    let chunk_id = format!("chunk_{}", Utc::now().timestamp());

    let transcription = match backend.select(config.backend).transcribe(&window).await {
        Ok(result) => Some(result),
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "transcription failed for window, emitting empty update");
            None
        }
    };

    let speaker = if config.speaker_diarization_enabled {
        let embedding = crate::speaker::embedding::extract(&window.samples, window.sample_rate_hz);
        let (name, _similarity) = registry.identify(&embedding, config.speaker_match_threshold);
        name
    } else {
        None
    };

    match transcription {
        Some(result) => TranscriptUpdate {
            session_id,
            chunk_id,
            text: result.text,
            is_final: true,
            confidence: result.confidence,
            speaker,
            timestamp: Utc::now(),
        },
        None => TranscriptUpdate {
            session_id,
            chunk_id,
            text: String::new(),
            is_final: true,
            confidence: 0.0,
            speaker,
            timestamp: Utc::now(),
        },
    }
}
