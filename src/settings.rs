use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Tunables for the ingestion pipeline and the chat bridge.
///
/// Missing fields in the settings file fall back to their defaults, so an
/// older file keeps working after new knobs are added.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub summary_chars: usize,
    pub keyword_count: usize,
    pub min_keyword_len: usize,
    pub chat_context_chars: usize,
    pub model: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub speech_enabled: bool,
    pub speech_lang: String,
    pub audio_cache_capacity: usize,
    pub max_sessions: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            summary_chars: 1000,
            keyword_count: 5,
            min_keyword_len: 5,
            chat_context_chars: 3000,
            model: DEFAULT_MODEL.to_string(),
            max_attempts: 3,
            base_delay_ms: 500,
            request_timeout_secs: 30,
            speech_enabled: true,
            speech_lang: "en".to_string(),
            audio_cache_capacity: 32,
            max_sessions: 256,
        }
    }
}

impl AppSettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub fn get_settings_path() -> PathBuf {
    let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config_dir.join("paperdesk").join("settings.json")
}

pub fn load_settings_from(path: &Path) -> AppSettings {
    if path.exists() {
        fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    } else {
        AppSettings::default()
    }
}

pub fn save_settings(settings: &AppSettings, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(|e| e.to_string())?;
    fs::write(path, json).map_err(|e| e.to_string())?;
    Ok(())
}

/// Reads the language-model credential. Blank values count as unset.
pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_gemini() {
        assert!(DEFAULT_MODEL.contains("gemini"));
    }

    #[test]
    fn keyword_filter_drops_short_tokens_by_default() {
        assert_eq!(AppSettings::default().min_keyword_len, 5);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed: AppSettings = serde_json::from_str(r#"{"summary_chars": 300}"#).unwrap();
        assert_eq!(parsed.summary_chars, 300);
        assert_eq!(parsed.max_attempts, 3);
        assert_eq!(parsed.chat_context_chars, 3000);
    }

    #[test]
    fn save_then_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = AppSettings {
            keyword_count: 10,
            ..AppSettings::default()
        };
        save_settings(&settings, &path).unwrap();
        assert_eq!(load_settings_from(&path), settings);
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(load_settings_from(&path), AppSettings::default());
    }
}
