//! Runtime configuration

use crate::error::VerseError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment override for the data directory
pub const DATA_DIR_ENV: &str = "DAILY_VERSE_DATA_DIR";

/// Bundled language shipped with the application. Never disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalLanguage {
    pub code: String,
    /// Registered source, used when the bundled copy cannot be read
    pub url: String,
    /// Bundled document, relative to the data directory unless absolute
    pub bundled_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerseConfig {
    pub default_language: String,
    pub local_languages: Vec<LocalLanguage>,
    pub data_dir: PathBuf,
    pub languages_manifest_url: Option<String>,
    pub document_cache_capacity: usize,
    pub request_timeout_secs: u64,
    pub verify_sources: bool,
}

impl Default for VerseConfig {
    fn default() -> Self {
        Self {
            default_language: "en".to_string(),
            local_languages: vec![
                LocalLanguage {
                    code: "en".to_string(),
                    url: "https://verses.dailyverse.app/data/verses_en.xml".to_string(),
                    bundled_path: PathBuf::from("verses/verses_en.xml"),
                },
                LocalLanguage {
                    code: "es".to_string(),
                    url: "https://verses.dailyverse.app/data/verses_es.xml".to_string(),
                    bundled_path: PathBuf::from("verses/verses_es.xml"),
                },
            ],
            data_dir: get_data_dir(),
            languages_manifest_url: None,
            document_cache_capacity: 16,
            request_timeout_secs: 30,
            verify_sources: true,
        }
    }
}

impl VerseConfig {
    /// Load a JSON config file; absent fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {:?}", path))?;
        let config: VerseConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config at {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// The default language must be one of the bundled languages
    pub fn validate(&self) -> Result<(), VerseError> {
        if self.local_languages.is_empty() {
            return Err(VerseError::Config("no local languages configured".into()));
        }
        if self.local(&self.default_language).is_none() {
            return Err(VerseError::Config(format!(
                "default language '{}' is not a local language",
                self.default_language
            )));
        }
        Ok(())
    }

    pub fn local(&self, code: &str) -> Option<&LocalLanguage> {
        self.local_languages.iter().find(|l| l.code == code)
    }

    /// `file://` URL of the bundled document for a local language
    pub fn bundled_url(&self, code: &str) -> Option<String> {
        let local = self.local(code)?;
        let path = if local.bundled_path.is_absolute() {
            local.bundled_path.clone()
        } else {
            self.data_dir.join(&local.bundled_path)
        };
        Some(format!("file://{}", path.display()))
    }

    pub fn settings_db_path(&self) -> PathBuf {
        self.data_dir.join("settings.db")
    }
}

/// Get the data directory
///
/// - `DAILY_VERSE_DATA_DIR` if set
/// - the platform data directory (`~/.local/share/daily-verse`, etc.)
/// - `./data` as a last resort
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("daily-verse");
    }
    PathBuf::from("data")
}
