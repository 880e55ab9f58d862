//! Per-session data model (§3, §4.I).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;

/// The streaming wire unit, appended to the Session Store and emitted to the
/// client in the same order (§4.I ordering guarantee).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptUpdate {
    pub session_id: Uuid,
    pub chunk_id: String,
    pub text: String,
    pub is_final: bool,
    pub confidence: f32,
    pub speaker: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Key under which a session's transcript log is stored (§4.J / §6).
pub fn store_key(session_id: Uuid) -> String {
    format!("transcript:{session_id}")
}

pub const SESSION_STORE_TTL_S: u64 = 86_400;

/// Lifecycle state of one client's streaming connection (§4.I). Transitions
/// are driven entirely inside `session::actor`; this enum exists for
/// inspection/logging, not as the actor's own control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Registered,
    Buffering,
    Processing,
    Draining,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct SessionMeta {
    pub client_id: Uuid,
    pub session_id: Uuid,
    pub connected_at: DateTime<Utc>,
    pub config: SessionConfig,
}
