pub mod chat;
pub mod error;
pub mod gemini;
pub mod lookup;
pub mod metadata;
pub mod pdf_processor;
pub mod pipeline;
pub mod server;
pub mod session;
pub mod settings;
pub mod speech;
pub mod summary;
#[cfg(test)]
pub(crate) mod test_pdf;

use std::path::Path;
use std::sync::Arc;

use reqwest::Client;

use crate::chat::{ChatBridge, RetryPolicy};
use crate::error::{AppError, AppResult};
use crate::gemini::{GeminiClient, LanguageModel};
use crate::lookup::RemoteLookup;
use crate::server::AppState;
use crate::settings::{api_key_from_env, AppSettings, API_KEY_ENV};
use crate::speech::{GoogleTts, SpeechSynthesizer};

fn http_client(settings: &AppSettings) -> AppResult<Client> {
    Client::builder()
        .timeout(settings.request_timeout())
        .build()
        .map_err(|e| AppError::Internal(format!("HTTP client error: {}", e)))
}

/// Wire the production collaborators: Gemini for chat (only when the
/// credential is set), Google TTS for speech and CrossRef/arXiv lookup.
pub fn build_state(settings: AppSettings) -> AppResult<AppState> {
    let client = http_client(&settings)?;

    let model: Option<Arc<dyn LanguageModel>> = match api_key_from_env() {
        Some(key) => {
            log::info!("Chat enabled with model {}", settings.model);
            Some(Arc::new(GeminiClient::new(
                client.clone(),
                key,
                settings.model.clone(),
            )))
        }
        None => {
            log::warn!("{} not set, /chat is disabled", API_KEY_ENV);
            None
        }
    };
    let chat = ChatBridge::new(
        model,
        RetryPolicy::from_settings(&settings),
        settings.chat_context_chars,
    );
    let speech: Arc<dyn SpeechSynthesizer> = Arc::new(GoogleTts::new(client.clone()));
    let lookup = Arc::new(RemoteLookup::new(client));

    Ok(AppState::new(settings, chat, Some(speech)).with_lookup(lookup))
}

/// Serve the HTTP API on `addr` until Ctrl-C.
pub async fn run(addr: &str, settings: AppSettings) -> AppResult<()> {
    let state = Arc::new(build_state(settings)?);
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}

/// Analyze a PDF without starting the server.
pub async fn analyze_file(
    path: &Path,
    settings: &AppSettings,
    speech_out: Option<&Path>,
) -> AppResult<()> {
    let speech = match speech_out {
        Some(out) => Some((GoogleTts::new(http_client(settings)?), out)),
        None => None,
    };
    let speech = speech
        .as_ref()
        .map(|(tts, out)| (tts as &dyn SpeechSynthesizer, *out));
    pipeline::analyze_headless(path, settings, speech).await
}
