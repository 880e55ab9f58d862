//! Application-wide and per-session configuration.
//!
//! Loaded once at process startup and passed explicitly to every collaborator
//! (registry, store, connection manager) rather than read ambiently from
//! inside a component — see the "global singletons → injected collaborators"
//! design note.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which transcription variant a session or batch call should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Remote,
    Local,
    Fallback,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Fallback
    }
}

/// Per-session knobs; overridable by a client's `config` envelope (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SessionConfig {
    pub chunk_duration_s: f32,
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub snr_noise_reduction_threshold_db: f32,
    pub speaker_match_threshold: f32,
    pub session_idle_timeout_s: u64,
    pub janitor_period_s: u64,
    pub backend: BackendKind,
    pub speaker_diarization_enabled: bool,
    /// Advisory only: `diarizer::diarize` picks its own `[2, min(10, n/2)]`
    /// search range and does not currently read this field, matching the
    /// reference implementation's own inert config knob of the same name.
    pub min_speakers: usize,
    /// Advisory only; see `min_speakers`.
    pub max_speakers: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_duration_s: 2.0,
            sample_rate_hz: 16_000,
            channels: 1,
            snr_noise_reduction_threshold_db: 10.0,
            speaker_match_threshold: 0.7,
            session_idle_timeout_s: 300,
            janitor_period_s: 30,
            backend: BackendKind::Fallback,
            speaker_diarization_enabled: true,
            min_speakers: 1,
            max_speakers: 10,
        }
    }
}

impl SessionConfig {
    /// Byte length of one full window at this config's canonical format.
    pub fn chunk_size_bytes(&self) -> usize {
        let samples = (self.sample_rate_hz as f32 * self.chunk_duration_s) as usize;
        samples * self.channels as usize * 2 // 16-bit signed PCM
    }
}

/// Process-wide configuration, layered from `config/default.toml` and
/// `AURIS_*` environment overrides (see SPEC_FULL.md §10.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding one binary record per trained speaker (§4.E / §6).
    pub speaker_registry_dir: PathBuf,
    /// Default session behavior; individual sessions may override via config envelopes.
    pub session_defaults: SessionConfig,
    /// Base URL for the remote transcription backend, when selected.
    pub remote_backend_url: Option<String>,
    /// Filesystem path to a local whisper.cpp GGML model, when the local backend is selected.
    pub local_model_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8002,
            speaker_registry_dir: default_registry_dir(),
            session_defaults: SessionConfig::default(),
            remote_backend_url: None,
            local_model_path: None,
        }
    }
}

fn default_registry_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("auris")
        .join("speakers")
}

impl AppConfig {
    /// Load configuration from `config/default.toml` (if present) overlaid
    /// with `AURIS_*` environment variables, e.g. `AURIS_PORT=9000`.
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("AURIS").separator("__"));

        let settings = builder.build()?;
        match settings.try_deserialize::<Self>() {
            Ok(cfg) => Ok(cfg),
            Err(_) => Ok(Self::default()),
        }
    }
}
