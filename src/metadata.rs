//! Document-info metadata extraction
//!
//! Reads the PDF info dictionary (title, author, creator, keywords) and
//! derives a publication year from a DOI entry or the modification date.
//! Best effort: malformed entries leave fields empty instead of failing.

use std::sync::OnceLock;

use lopdf::{Dictionary, Document, Object};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Metadata record returned to clients. Every field defaults to empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub title: String,
    pub authors: String,
    pub year: String,
    pub journal: String,
    pub keywords: String,
}

impl MetadataRecord {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.authors.is_empty()
            && self.year.is_empty()
            && self.journal.is_empty()
            && self.keywords.is_empty()
    }
}

fn year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(19|20)\d{2}").expect("valid year pattern"))
}

/// First `19xx`/`20xx` run in `field`, or an empty string.
pub fn derive_year(field: &str) -> String {
    year_pattern()
        .find(field)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Extract metadata from an in-memory PDF.
///
/// Returns [`AppError::Decode`] when the bytes are not a PDF and
/// [`AppError::ExtractionEmpty`] when nothing usable was found.
pub fn extract_metadata(bytes: &[u8]) -> AppResult<MetadataRecord> {
    let doc = Document::load_mem(bytes).map_err(|e| AppError::Decode(e.to_string()))?;

    let record = info_dictionary(&doc)
        .map(record_from_info)
        .unwrap_or_default();

    if record.is_empty() {
        log::info!("No usable document-info metadata found");
        return Err(AppError::ExtractionEmpty);
    }
    Ok(record)
}

/// Run [`extract_metadata`] on the blocking pool.
pub async fn extract_metadata_async(bytes: Vec<u8>) -> AppResult<MetadataRecord> {
    tokio::task::spawn_blocking(move || extract_metadata(&bytes))
        .await
        .map_err(|e| AppError::Internal(format!("metadata task failed: {}", e)))?
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn record_from_info(info: &Dictionary) -> MetadataRecord {
    let field = |key: &[u8]| {
        info.get(key)
            .ok()
            .and_then(decode_info_string)
            .unwrap_or_default()
    };

    // A DOI entry, when present, is the only year source.
    let doi = info
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(b"doi"))
        .map(|(_, value)| decode_info_string(value).unwrap_or_default());
    let year = match doi {
        Some(doi) => derive_year(&doi),
        None => derive_year(&field(b"ModDate")),
    };

    MetadataRecord {
        title: field(b"Title"),
        authors: field(b"Author"),
        year,
        journal: field(b"Creator"),
        keywords: field(b"Keywords"),
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, else UTF-8, else Latin-1.
fn decode_info_string(value: &Object) -> Option<String> {
    let Object::String(bytes, _) = value else {
        return None;
    };

    let text = if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => bytes.iter().map(|&b| b as char).collect(),
        }
    };

    Some(text.trim().to_string())
}
