//! Wire envelopes for the streaming endpoint (§6).
//!
//! The original source passes free-form dicts over the socket; every shape
//! here is a declared, tagged record and unknown fields on ingress are
//! rejected rather than silently ignored (§9 "dynamic typing → fixed schemas").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::session::types::TranscriptUpdate;

/// A server → client message, tagged by `type` with the payload under `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        client_id: Uuid,
        session_id: Uuid,
        config: SessionConfig,
    },
    TranscriptUpdate(TranscriptUpdate),
    ConfigUpdated {
        config: SessionConfig,
    },
}

impl ServerMessage {
    /// Wrap this message in the outer envelope carrying `session_id` and `timestamp`,
    /// matching the `{type, data, session_id, timestamp}` shape from §6.
    pub fn into_envelope(self, session_id: Uuid) -> Envelope {
        Envelope {
            message: self,
            session_id,
            timestamp: Utc::now(),
        }
    }
}

/// The outer envelope actually written to the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub message: ServerMessage,
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// A client → server control message. Raw binary frames are PCM chunks and
/// never pass through this type; only typed JSON frames do.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case", deny_unknown_fields)]
pub enum ClientMessage {
    Config(SessionConfig),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_established_round_trips_through_json() {
        let msg = ServerMessage::ConnectionEstablished {
            client_id: Uuid::nil(),
            session_id: Uuid::nil(),
            config: SessionConfig::default(),
        };
        let envelope = msg.into_envelope(Uuid::nil());
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"type\":\"connection_established\""));
        let _: Envelope = serde_json::from_str(&json).unwrap();
    }

    #[test]
    fn client_config_message_rejects_unknown_fields() {
        let json = r#"{"type":"config","data":{},"bogus":1}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }
}
