//! Streaming Session (§4.I): per-client actor, its wire-adjacent data model,
//! and the command protocol the Connection Manager drives it with.

pub mod actor;
pub mod types;

pub use actor::{spawn, SessionCollaborators, SessionCommand, SessionHandle};
pub use types::{SessionMeta, SessionState, TranscriptUpdate};
