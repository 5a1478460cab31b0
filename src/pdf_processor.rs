//! PDF text extraction module

use std::panic;

use crate::error::{AppError, AppResult};

/// Extract text content from an in-memory PDF.
///
/// Pages are concatenated in page order without separators. pdf-extract can
/// panic on some malformed inputs; that is reported as a decode failure.
pub fn extract_text(bytes: &[u8]) -> AppResult<String> {
    if bytes.is_empty() {
        return Err(AppError::Decode("empty upload".to_string()));
    }

    let pages = guarded(|| pdf_extract::extract_text_from_mem_by_pages(bytes))?;

    log::debug!("Extracted text from {} page(s)", pages.len());
    Ok(pages.concat())
}

/// Run a parser call, turning both its error and a panic into `Decode`.
fn guarded<T, E, F>(parse: F) -> AppResult<T>
where
    E: std::fmt::Display,
    F: FnOnce() -> Result<T, E> + panic::UnwindSafe,
{
    panic::catch_unwind(parse)
        .map_err(|_| AppError::Decode("PDF parser crashed".to_string()))?
        .map_err(|e| AppError::Decode(e.to_string()))
}

/// Run [`extract_text`] on the blocking pool.
pub async fn extract_text_async(bytes: Vec<u8>) -> AppResult<String> {
    tokio::task::spawn_blocking(move || extract_text(&bytes))
        .await
        .map_err(|e| AppError::Internal(format!("extraction task failed: {}", e)))?
}
