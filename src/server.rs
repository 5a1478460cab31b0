//! HTTP interface
//!
//! Routes:
//! - `GET /` serves the embedded front-end entry page
//! - `GET /health` reports readiness and whether chat is configured
//! - `POST /extract_metadata` takes a multipart `file` and returns its metadata
//! - `POST /fetch_metadata` looks metadata up by DOI or arXiv id
//! - `POST /summarize` takes a multipart `file` and returns summary, keywords,
//!   full text, a session id for chat and an audio link
//! - `POST /chat` answers a question against a session's document
//! - `GET /audio/{id}` streams synthesized summary audio

use std::any::Any;
use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;

use crate::chat::{ChatBridge, ChatReply};
use crate::error::{AppError, AppResult};
use crate::lookup::{IdentifierKind, MetadataSource};
use crate::metadata::{extract_metadata_async, MetadataRecord};
use crate::pipeline::analyze_text;
use crate::session::SessionStore;
use crate::settings::AppSettings;
use crate::speech::{AudioStore, SpeechSynthesizer};
use crate::summary::KeywordEntry;

const INDEX_HTML: &str = include_str!("../static/index.html");
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;
const SPEECH_UNAVAILABLE: &str = "Speech synthesis unavailable";

pub struct AppState {
    pub settings: AppSettings,
    pub sessions: SessionStore,
    pub chat: ChatBridge,
    pub audio: AudioStore,
    /// `None` disables speech synthesis.
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    /// `None` disables `/fetch_metadata`.
    pub lookup: Option<Arc<dyn MetadataSource>>,
}

impl AppState {
    pub fn new(
        settings: AppSettings,
        chat: ChatBridge,
        speech: Option<Arc<dyn SpeechSynthesizer>>,
    ) -> Self {
        Self {
            sessions: SessionStore::new(settings.max_sessions),
            audio: AudioStore::new(settings.audio_cache_capacity),
            speech: speech.filter(|_| settings.speech_enabled),
            settings,
            chat,
            lookup: None,
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn MetadataSource>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_audio_store(mut self, audio: AudioStore) -> Self {
        self.audio = audio;
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub chat_enabled: bool,
    pub sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummarizeResponse {
    pub session_id: String,
    pub summary: String,
    pub keywords: Vec<KeywordEntry>,
    pub full_text: String,
    pub audio_url: Option<String>,
    pub audio_error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FetchMetadataRequest {
    pub identifier: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<IdentifierKind>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub session_id: Option<String>,
    pub system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub warning: bool,
}

pub fn router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/extract_metadata", post(extract_metadata))
        .route("/fetch_metadata", post(fetch_metadata))
        .route("/summarize", post(summarize))
        .route("/chat", post(chat))
        .route("/audio/{id}", get(audio))
        .with_state(state);
    with_layers(routes)
}

fn with_layers(routes: Router) -> Router {
    routes
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::custom(panic_response))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        chat_enabled: state.chat.is_enabled(),
        sessions: state.sessions.len().await,
    })
}

/// Pull the `file` field out of a multipart upload.
async fn read_upload(mut multipart: Multipart) -> AppResult<Vec<u8>> {
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() == Some("file") {
            let bytes = field.bytes().await.map_err(upload_error)?;
            return Ok(bytes.to_vec());
        }
    }
    Err(AppError::BadRequest("No file uploaded".to_string()))
}

fn upload_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(format!("Invalid upload: {}", e.body_text()))
    }
}

async fn extract_metadata(multipart: Multipart) -> AppResult<Json<MetadataRecord>> {
    let bytes = read_upload(multipart).await?;
    log::info!("POST /extract_metadata ({} bytes)", bytes.len());
    let record = extract_metadata_async(bytes).await?;
    Ok(Json(record))
}

async fn fetch_metadata(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FetchMetadataRequest>, JsonRejection>,
) -> AppResult<Json<MetadataRecord>> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let identifier = request
        .identifier
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    let (Some(identifier), Some(kind)) = (identifier, request.kind) else {
        return Err(AppError::BadRequest("Missing identifier or type".to_string()));
    };
    log::info!("POST /fetch_metadata ({:?})", kind);

    let lookup = state
        .lookup
        .as_ref()
        .ok_or_else(|| AppError::Configuration("metadata lookup is disabled".to_string()))?;
    let record = lookup.lookup(kind, identifier).await?;
    Ok(Json(record))
}

async fn summarize(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> AppResult<Json<SummarizeResponse>> {
    let bytes = read_upload(multipart).await?;
    log::info!("POST /summarize ({} bytes)", bytes.len());

    let analysis = analyze_text(bytes, &state.settings).await?;
    let session_id = state.sessions.create(analysis.full_text.clone()).await;

    let (audio_url, audio_error) = match synthesize_summary(&state, &analysis.summary).await {
        Ok(id) => (Some(format!("/audio/{}", id)), None),
        Err(e) => {
            log::warn!("{}", e);
            (None, Some(SPEECH_UNAVAILABLE.to_string()))
        }
    };

    Ok(Json(SummarizeResponse {
        session_id,
        summary: analysis.summary,
        keywords: analysis.keywords,
        full_text: analysis.full_text,
        audio_url,
        audio_error,
    }))
}

/// Summary audio id, bounded by the request timeout.
async fn synthesize_summary(state: &AppState, summary: &str) -> AppResult<String> {
    let speech = state
        .speech
        .as_ref()
        .ok_or_else(|| AppError::Synthesis("speech is disabled".to_string()))?;
    let timeout = state.settings.request_timeout();
    let synthesis = state.audio.get_or_synthesize(
        speech.as_ref(),
        summary,
        &state.settings.speech_lang,
    );

    match tokio::time::timeout(timeout, synthesis).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Synthesis(format!(
            "timed out after {}s",
            timeout.as_secs_f32()
        ))),
    }
}

async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let message = request
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing message".to_string()))?;
    log::info!("POST /chat");

    let session = match request.session_id.as_deref() {
        Some(id) => state.sessions.get(id).await,
        None => None,
    };
    let context = session.as_ref().map(|s| &*s.text);

    let reply = state.chat.ask(context, message, request.system).await?;
    let status = match reply {
        ChatReply::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    let body = ChatResponse {
        response: reply.text().to_string(),
        warning: matches!(reply, ChatReply::Warning(_)),
    };
    Ok((status, Json(body)).into_response())
}

async fn audio(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.audio.read(&id).await {
        Some(bytes) => ([(header::CONTENT_TYPE, "audio/mpeg")], bytes).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Audio not found" })),
        )
            .into_response(),
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    AppError::Internal(format!("Internal error: {}", detail)).into_response()
}
