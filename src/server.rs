//! Thin HTTP/WebSocket transport (§6). Upload middleware, auth, and CORS
//! policy belong to an external collaborator (§1); what lives here is just
//! enough routing to exercise the Streaming Session and Batch Pipeline from
//! a socket or a request body.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::connection::ConnectionManager;
use crate::pipeline;
use crate::speaker::registry::SharedSpeakerRegistry;
use crate::store::SessionStore;
use crate::transcription::BackendSet;
use crate::wire::{ClientMessage, ServerMessage};

pub struct AppState {
    pub config: AppConfig,
    pub connections: Arc<ConnectionManager>,
    pub registry: SharedSpeakerRegistry,
    pub backends: Arc<BackendSet>,
    pub store: Arc<dyn SessionStore>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade))
        .route("/process-audio", post(process_audio))
        .route("/identify-speakers", post(identify_speakers))
        .route("/train-speaker/{name}", post(train_speaker))
        .route("/speakers", get(list_speakers))
        .route("/speakers/{name}", delete(delete_speaker))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ws_upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();

    let config = state.config.session_defaults.clone();
    let (handle, mut outbound) = state.connections.register(config.clone());
    let session_id = handle.session_id;
    let client_id = handle.client_id;

    let established = ServerMessage::ConnectionEstablished {
        client_id,
        session_id,
        config,
    }
    .into_envelope(session_id);
    if let Ok(json) = serde_json::to_string(&established) {
        let _ = sink.send(Message::Text(json.into())).await;
    }

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let envelope = message.into_envelope(session_id);
            match serde_json::to_string(&envelope) {
                Ok(json) => {
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to serialize outbound message"),
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let message = match frame {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "websocket read error, treating as disconnect");
                break;
            }
        };
        match message {
            Message::Binary(bytes) => {
                state.connections.route_chunk(client_id, bytes.to_vec());
            }
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Config(cfg)) => {
                    state.connections.route_config_update(client_id, cfg);
                }
                Err(e) => warn!(error = %e, "rejecting malformed client message"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.connections.disconnect(client_id);
    writer.abort();
}

#[derive(Debug, Deserialize)]
struct FilenameQuery {
    filename: Option<String>,
}

async fn process_audio(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FilenameQuery>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let threshold = state.config.session_defaults.snr_noise_reduction_threshold_db;
    let backend = state.backends.select(state.config.session_defaults.backend);
    match pipeline::process_audio(&body, query.filename.as_deref(), backend, threshold).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn identify_speakers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FilenameQuery>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let threshold = state.config.session_defaults.speaker_match_threshold;
    match pipeline::identify_speakers(&body, query.filename.as_deref(), &state.registry, threshold).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn train_speaker(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<FilenameQuery>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    match pipeline::train_speaker(&name, &body, query.filename.as_deref(), &state.registry).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_speakers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.list())
}

async fn delete_speaker(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> impl IntoResponse {
    match state.registry.delete(&name).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!(name, error = %e, "speaker delete failed");
            axum::http::StatusCode::NOT_FOUND.into_response()
        }
    }
}

fn error_response(e: anyhow::Error) -> axum::response::Response {
    warn!(error = %e, "request failed");
    (
        axum::http::StatusCode::UNPROCESSABLE_ENTITY,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
        .into_response()
}
