use std::sync::Arc;
use std::time::Duration;

use auris_core::config::AppConfig;
use auris_core::connection::ConnectionManager;
use auris_core::server::{self, AppState};
use auris_core::speaker::SpeakerRegistry;
use auris_core::store::InMemorySessionStore;
use auris_core::transcription::{BackendSet, TranscriptionBackend};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;

    let registry = Arc::new(SpeakerRegistry::load(&config.speaker_registry_dir).await?);
    let store: Arc<dyn auris_core::store::SessionStore> = Arc::new(InMemorySessionStore::new());
    let backends = Arc::new(build_backend_set(&config)?);

    let connections = ConnectionManager::new(registry.clone(), backends.clone(), store.clone());
    tokio::spawn(
        connections
            .clone()
            .run_janitor(Duration::from_secs(config.session_defaults.janitor_period_s)),
    );

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState {
        config,
        connections,
        registry,
        backends,
        store,
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "auris-server listening");
    axum::serve(listener, server::router(state)).await?;

    Ok(())
}

/// Build every backend variant the deployment has configured, independent of
/// which one `session_defaults.backend` happens to name at startup — a
/// session can switch to any of them later via its `config` envelope
/// (SPEC_FULL Open Question Resolution #1).
fn build_backend_set(config: &AppConfig) -> anyhow::Result<BackendSet> {
    let remote = config.remote_backend_url.clone().map(TranscriptionBackend::remote);
    let local = config
        .local_model_path
        .as_deref()
        .map(TranscriptionBackend::local)
        .transpose()?;
    Ok(BackendSet::new(remote, local))
}
