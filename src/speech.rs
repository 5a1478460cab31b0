//! Text-to-speech synthesis and scoped audio storage
//!
//! Audio lives in temp files owned by [`AudioStore`]. Files are removed when
//! their entry is evicted or the store is dropped.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use tempfile::TempPath;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};

const TTS_URL: &str = "https://translate.google.com/translate_tts";
const TTS_CHUNK_CHARS: usize = 100;

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` to MP3 bytes.
    async fn synthesize(&self, text: &str, lang: &str) -> AppResult<Vec<u8>>;
}

/// Google Translate TTS endpoint, one request per text chunk.
pub struct GoogleTts {
    client: Client,
}

impl GoogleTts {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(&self, text: &str, lang: &str) -> AppResult<Vec<u8>> {
        let chunks = split_for_tts(text, TTS_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(AppError::Synthesis("nothing to speak".to_string()));
        }

        let total = chunks.len().to_string();
        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let response = self
                .client
                .get(TTS_URL)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", lang),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await
                .map_err(|e| AppError::Synthesis(format!("Request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(AppError::Synthesis(format!(
                    "TTS error {}",
                    response.status()
                )));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| AppError::Synthesis(format!("Failed to read audio: {}", e)))?;
            audio.extend_from_slice(&bytes);
        }

        Ok(audio)
    }
}

/// Split on whitespace into chunks of at most `max_chars`; an over-long word
/// is hard-split.
pub fn split_for_tts(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            chunks.push(word.into_iter().collect());
            word = rest;
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() { word.len() } else { word.len() + 1 };
        if current_len + needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word.iter());
        current_len += word.len();
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Content hash used as the audio id (hex BLAKE3 of language and text).
pub fn content_hash(lang: &str, text: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(lang.as_bytes());
    hasher.update(&[0]);
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}

struct AudioEntries {
    files: HashMap<String, TempPath>,
    order: VecDeque<String>,
}

/// Bounded cache of synthesized audio keyed by content hash.
pub struct AudioStore {
    dir: Option<PathBuf>,
    capacity: usize,
    entries: Mutex<AudioEntries>,
}

impl AudioStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            dir: None,
            capacity: capacity.max(1),
            entries: Mutex::new(AudioEntries {
                files: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Place temp files under `dir` instead of the system temp directory.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Synthesize `text` unless identical audio is already cached, and
    /// return its id.
    pub async fn get_or_synthesize(
        &self,
        synthesizer: &dyn SpeechSynthesizer,
        text: &str,
        lang: &str,
    ) -> AppResult<String> {
        let id = content_hash(lang, text);
        if self.entries.lock().await.files.contains_key(&id) {
            log::debug!("Audio cache hit for {}", id);
            return Ok(id);
        }

        let audio = synthesizer.synthesize(text, lang).await?;
        let path = self.write_temp(&audio)?;
        self.insert(id.clone(), path).await;
        Ok(id)
    }

    pub async fn read(&self, id: &str) -> Option<Vec<u8>> {
        let path = {
            let entries = self.entries.lock().await;
            entries.files.get(id).map(|p| p.to_path_buf())?
        };
        tokio::fs::read(path).await.ok()
    }

    #[cfg(test)]
    async fn path_of(&self, id: &str) -> Option<PathBuf> {
        let entries = self.entries.lock().await;
        entries.files.get(id).map(|p| p.to_path_buf())
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.files.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn write_temp(&self, audio: &[u8]) -> AppResult<TempPath> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("paperdesk-audio-").suffix(".mp3");
        let mut file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(audio)?;
        file.flush()?;
        Ok(file.into_temp_path())
    }

    async fn insert(&self, id: String, path: TempPath) {
        let mut entries = self.entries.lock().await;
        if entries.files.insert(id.clone(), path).is_none() {
            entries.order.push_back(id);
        }
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                if let Some(evicted) = entries.files.remove(&oldest) {
                    log::debug!("Evicting audio {}", oldest);
                    if let Err(e) = evicted.close() {
                        log::warn!("Failed to remove audio file: {}", e);
                    }
                }
            }
        }
    }
}

/// Write synthesized audio to a caller-chosen path.
pub async fn synthesize_to_file(
    synthesizer: &dyn SpeechSynthesizer,
    text: &str,
    lang: &str,
    out: &Path,
) -> AppResult<()> {
    let audio = synthesizer.synthesize(text, lang).await?;
    tokio::fs::write(out, audio).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Returns the text bytes as "audio", or fails when `fail` is set.
    #[derive(Default)]
    pub struct FakeTts {
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeTts {
        async fn synthesize(&self, text: &str, _lang: &str) -> AppResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AppError::Synthesis("offline".to_string()))
            } else {
                Ok(text.as_bytes().to_vec())
            }
        }
    }
}
