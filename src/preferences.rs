//! User preferences stored as JSON values under `pref_` keys

use crate::error::VerseError;
use crate::storage::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

const PREFIX: &str = "pref_";
const LANGUAGE: &str = "language";
const CUSTOM_BACKGROUNDS: &str = "custom_backgrounds";

pub struct PreferencesStore {
    store: Arc<dyn KeyValueStore>,
}

impl PreferencesStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(name: &str) -> String {
        format!("{}{}", PREFIX, name)
    }

    /// Typed read. A value that no longer deserializes reads as `None`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, VerseError> {
        let Some(raw) = self.store.get(&Self::key(name))? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Ignoring unreadable preference '{}': {}", name, e);
                Ok(None)
            }
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), VerseError> {
        let raw = serde_json::to_string(value)?;
        self.store.set(&Self::key(name), &raw)
    }

    /// Untyped read of the stored JSON text
    pub fn get_string(&self, name: &str) -> Result<Option<String>, VerseError> {
        self.store.get(&Self::key(name))
    }

    pub fn set_string(&self, name: &str, raw: &str) -> Result<(), VerseError> {
        self.store.set(&Self::key(name), raw)
    }

    pub fn remove(&self, name: &str) -> Result<(), VerseError> {
        self.store.remove(&Self::key(name))
    }

    /// Names of every stored preference
    pub fn names(&self) -> Result<Vec<String>, VerseError> {
        Ok(self
            .store
            .keys()?
            .into_iter()
            .filter_map(|k| k.strip_prefix(PREFIX).map(str::to_string))
            .collect())
    }

    pub fn language(&self) -> Option<String> {
        self.get(LANGUAGE).unwrap_or_else(|e| {
            warn!("Failed to read language preference: {}", e);
            None
        })
    }

    pub fn set_language(&self, code: &str) -> Result<(), VerseError> {
        self.set(LANGUAGE, code)
    }

    pub fn custom_backgrounds(&self) -> Vec<String> {
        self.get(CUSTOM_BACKGROUNDS).ok().flatten().unwrap_or_default()
    }

    /// Add a background; duplicates are ignored
    pub fn add_custom_background(&self, background: &str) -> Result<Vec<String>, VerseError> {
        let mut backgrounds = self.custom_backgrounds();
        if !backgrounds.iter().any(|b| b == background) {
            backgrounds.push(background.to_string());
            self.set(CUSTOM_BACKGROUNDS, &backgrounds)?;
        }
        Ok(backgrounds)
    }

    pub fn remove_custom_background(&self, background: &str) -> Result<Vec<String>, VerseError> {
        let mut backgrounds = self.custom_backgrounds();
        let before = backgrounds.len();
        backgrounds.retain(|b| b != background);
        if backgrounds.len() != before {
            self.set(CUSTOM_BACKGROUNDS, &backgrounds)?;
        }
        Ok(backgrounds)
    }
}
