//! HTTP gateway for Jarvis.
//!
//! Thin request/response wrappers around the orchestrator and the speech
//! provider, plus the embedded web client:
//!
//! - `POST /api/chat` `{message}` → `{response}`
//! - `POST /api/transcribe` (multipart field `audio`) → `{text}`
//! - `POST /api/speak` `{text}` → `audio/mpeg`
//! - `GET /health`
//!
//! Built on Axum. [`mcp`] serves the same capabilities to MCP clients over stdio.

pub mod frontend;
pub mod mcp;

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use jarvis_agent::Orchestrator;
use jarvis_config::AppConfig;
use jarvis_core::SpeechProvider;

/// Shared application state.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub speech: Arc<dyn SpeechProvider>,
}

type SharedState = Arc<AppState>;

/// Build the router with the API, the web client and the common layers.
pub fn build_router(state: SharedState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/transcribe", post(transcribe_handler))
        .route("/api/speak", post(speak_handler))
        .with_state(state)
        .merge(frontend::frontend_router())
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Provider, capability catalog and orchestrator are built once and shared.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = jarvis_providers::build_from_config(&config)?;
    let tools = Arc::new(jarvis_tools::default_registry(&config)?);
    let orchestrator = Arc::new(Orchestrator::from_config(provider.clone(), tools, &config));

    let state = Arc::new(AppState {
        orchestrator,
        speech: provider,
    });
    let app = build_router(state, config.gateway.max_body_bytes);

    info!(addr = %addr, model = %config.model, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct ChatRequest {
    message: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

#[derive(Deserialize)]
struct SpeakRequest {
    text: Option<String>,
}

#[derive(Serialize)]
struct TranscribeResponse {
    text: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// Pull a non-blank string field out of a JSON body. Anything malformed
/// counts as missing.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

async fn chat_handler(State(state): State<SharedState>, body: Bytes) -> Response {
    let message = serde_json::from_slice::<ChatRequest>(&body)
        .ok()
        .and_then(|req| non_blank(req.message));
    let Some(message) = message else {
        return error_response(StatusCode::BAD_REQUEST, "No se recibió mensaje");
    };

    info!(message_len = message.len(), "Chat message received");

    let now = chrono::Local::now().naive_local();
    match state.orchestrator.respond(&message, now).await {
        Ok(response) => Json(ChatResponse { response }).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to generate response");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Error al generar respuesta")
        }
    }
}

async fn transcribe_handler(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    const MISSING: &str = "No se recibió archivo de audio";

    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => {
            warn!(error = %e, "Transcription request is not multipart");
            return error_response(StatusCode::BAD_REQUEST, MISSING);
        }
    };

    let mut audio = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("audio") => {
                let file_name = field.file_name().unwrap_or("audio.webm").to_string();
                match field.bytes().await {
                    Ok(bytes) => audio = Some((bytes, file_name)),
                    Err(e) => {
                        warn!(error = %e, "Failed to read audio field");
                        return error_response(StatusCode::BAD_REQUEST, MISSING);
                    }
                }
                break;
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Malformed multipart body");
                return error_response(StatusCode::BAD_REQUEST, MISSING);
            }
        }
    }

    let Some((bytes, file_name)) = audio.filter(|(bytes, _)| !bytes.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, MISSING);
    };

    info!(size = bytes.len(), file_name = %file_name, "Audio received for transcription");
    match state.speech.transcribe(bytes.to_vec(), &file_name).await {
        Ok(text) => Json(TranscribeResponse { text }).into_response(),
        Err(e) => {
            error!(error = %e, "Transcription failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Error al transcribir audio")
        }
    }
}

async fn speak_handler(State(state): State<SharedState>, body: Bytes) -> Response {
    let text = serde_json::from_slice::<SpeakRequest>(&body)
        .ok()
        .and_then(|req| non_blank(req.text));
    let Some(text) = text else {
        return error_response(StatusCode::BAD_REQUEST, "No se recibió texto");
    };

    match state.speech.synthesize(&text).await {
        Ok(audio) => {
            info!(size = audio.len(), "Speech audio generated");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "audio/mpeg"),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                audio,
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Speech synthesis failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Error al generar audio")
        }
    }
}
