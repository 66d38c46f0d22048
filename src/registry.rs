//! Language availability: which languages exist, where their documents live,
//! and which ones have been disabled after a load failure.

use crate::config::VerseConfig;
use crate::error::VerseError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageEntry {
    pub code: String,
    pub source_url: String,
    pub is_local: bool,
    pub is_active: bool,
    pub is_disabled: bool,
}

/// Language as reported by the administrative configuration source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLanguage {
    pub code: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LanguageEvent {
    Disabled { code: String },
    Changed { from: String, to: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Substitution {
    Unknown,
    Disabled,
    Inactive,
    MissingUrl,
}

/// Outcome of resolving a language code to a usable source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub requested: String,
    /// Code whose document will actually be used
    pub code: String,
    pub url: String,
    pub substitution: Option<Substitution>,
}

impl Resolution {
    pub fn is_substituted(&self) -> bool {
        self.substitution.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationDelta {
    /// Remote entries inserted or updated
    pub updated: usize,
    /// Codes whose source URL changed or that became usable or unusable
    pub changed_sources: Vec<String>,
}

/// Administrative language configuration (external, eventually consistent)
#[async_trait]
pub trait LanguageConfigSource: Send + Sync {
    async fn active_languages(&self) -> Result<Vec<RemoteLanguage>, VerseError>;
    async fn set_language_active(&self, code: &str, active: bool) -> Result<bool, VerseError>;
}

/// In-memory configuration source
#[derive(Default)]
pub struct StaticConfigSource {
    languages: Mutex<Vec<RemoteLanguage>>,
    reads: AtomicUsize,
    writes: Mutex<Vec<(String, bool)>>,
}

impl StaticConfigSource {
    pub fn new(languages: Vec<RemoteLanguage>) -> Self {
        Self {
            languages: Mutex::new(languages),
            ..Default::default()
        }
    }

    pub fn replace(&self, languages: Vec<RemoteLanguage>) {
        *self.languages.lock().unwrap_or_else(|e| e.into_inner()) = languages;
    }

    /// Number of `active_languages` calls served
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Write-backs received, in order
    pub fn writes(&self) -> Vec<(String, bool)> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl LanguageConfigSource for StaticConfigSource {
    async fn active_languages(&self) -> Result<Vec<RemoteLanguage>, VerseError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        // Give concurrent refreshes a chance to pile up behind the guard
        tokio::task::yield_now().await;
        Ok(self.languages.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn set_language_active(&self, code: &str, active: bool) -> Result<bool, VerseError> {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((code.to_string(), active));
        let mut languages = self.languages.lock().unwrap_or_else(|e| e.into_inner());
        match languages.iter_mut().find(|l| l.code == code) {
            Some(language) => {
                language.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub struct LanguageRegistry {
    default_code: String,
    entries: RwLock<HashMap<String, LanguageEntry>>,
    events: broadcast::Sender<LanguageEvent>,
    refresh_guard: tokio::sync::Mutex<Option<Result<ConfigurationDelta, VerseError>>>,
    refresh_generation: AtomicU64,
}

impl LanguageRegistry {
    /// Build a registry seeded with the configured local languages
    pub fn new(config: &VerseConfig) -> Self {
        let entries = config
            .local_languages
            .iter()
            .map(|local| {
                (
                    local.code.clone(),
                    LanguageEntry {
                        code: local.code.clone(),
                        source_url: local.url.clone(),
                        is_local: true,
                        is_active: true,
                        is_disabled: false,
                    },
                )
            })
            .collect();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            default_code: config.default_language.clone(),
            entries: RwLock::new(entries),
            events,
            refresh_guard: tokio::sync::Mutex::new(None),
            refresh_generation: AtomicU64::new(0),
        }
    }

    pub fn default_code(&self) -> &str {
        &self.default_code
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LanguageEvent> {
        self.events.subscribe()
    }

    /// Fire-and-forget broadcast; having no subscribers is fine
    pub fn notify(&self, event: LanguageEvent) {
        let _ = self.events.send(event);
    }

    pub fn entry(&self, code: &str) -> Option<LanguageEntry> {
        self.read().get(code).cloned()
    }

    /// All entries sorted by code
    pub fn entries(&self) -> Vec<LanguageEntry> {
        let mut entries: Vec<LanguageEntry> = self.read().values().cloned().collect();
        entries.sort_by(|a, b| a.code.cmp(&b.code));
        entries
    }

    pub fn is_disabled(&self, code: &str) -> bool {
        self.read().get(code).map(|e| e.is_disabled).unwrap_or(false)
    }

    pub fn is_local(&self, code: &str) -> bool {
        self.read().get(code).map(|e| e.is_local).unwrap_or(false)
    }

    /// Codes that currently resolve to themselves
    pub fn available_codes(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| Self::usable(e).is_ok())
            .map(|e| e.code)
            .collect()
    }

    /// Mark `code` disabled. Local languages cannot be disabled.
    ///
    /// Returns true if the language transitioned to disabled.
    pub fn disable(&self, code: &str) -> bool {
        {
            let mut entries = self.write();
            let entry = entries.entry(code.to_string()).or_insert_with(|| LanguageEntry {
                code: code.to_string(),
                source_url: String::new(),
                is_local: false,
                is_active: false,
                is_disabled: false,
            });
            if entry.is_local {
                warn!("Refusing to disable local language '{}'", code);
                return false;
            }
            if entry.is_disabled {
                return false;
            }
            entry.is_disabled = true;
        }
        warn!("Language '{}' disabled", code);
        self.notify(LanguageEvent::Disabled {
            code: code.to_string(),
        });
        true
    }

    fn usable(entry: &LanguageEntry) -> Result<(), Substitution> {
        if entry.is_local {
            return Ok(());
        }
        if entry.is_disabled {
            Err(Substitution::Disabled)
        } else if !entry.is_active {
            Err(Substitution::Inactive)
        } else if entry.source_url.is_empty() {
            Err(Substitution::MissingUrl)
        } else {
            Ok(())
        }
    }

    /// Resolve `code` to the source actually used, substituting the default
    /// language when `code` is unknown or unusable.
    pub fn resolve(&self, code: &str) -> Resolution {
        let entries = self.read();
        let substitution = match entries.get(code) {
            None => Some(Substitution::Unknown),
            Some(entry) => Self::usable(entry).err(),
        };

        let effective = match substitution {
            None => entries.get(code),
            Some(_) => entries.get(&self.default_code),
        };

        Resolution {
            requested: code.to_string(),
            code: if substitution.is_some() {
                self.default_code.clone()
            } else {
                code.to_string()
            },
            url: effective.map(|e| e.source_url.clone()).unwrap_or_default(),
            substitution,
        }
    }

    pub fn resolve_url(&self, code: &str) -> String {
        self.resolve(code).url
    }

    /// Merge administrative configuration. Local languages are never touched.
    pub fn apply_configuration(&self, languages: Vec<RemoteLanguage>) -> ConfigurationDelta {
        let mut delta = ConfigurationDelta::default();
        let mut entries = self.write();

        for entry in entries.values_mut().filter(|e| !e.is_local) {
            if entry.is_active && !languages.iter().any(|l| l.code == entry.code) {
                let was_usable = Self::usable(entry).is_ok();
                entry.is_active = false;
                if was_usable {
                    delta.changed_sources.push(entry.code.clone());
                }
            }
        }

        for language in languages {
            if entries.get(&language.code).map(|e| e.is_local).unwrap_or(false) {
                debug!("Ignoring configuration for local language '{}'", language.code);
                continue;
            }
            let entry = entries
                .entry(language.code.clone())
                .or_insert_with(|| LanguageEntry {
                    code: language.code.clone(),
                    source_url: String::new(),
                    is_local: false,
                    is_active: false,
                    is_disabled: false,
                });

            let was_usable = Self::usable(entry).is_ok();
            let url_changed = entry.source_url != language.url;
            entry.source_url = language.url;
            entry.is_active = language.is_active;
            if entry.is_active && !entry.source_url.is_empty() {
                entry.is_disabled = false;
            }
            let now_usable = Self::usable(entry).is_ok();

            delta.updated += 1;
            if url_changed || now_usable != was_usable {
                delta.changed_sources.push(entry.code.clone());
            }
        }

        delta.changed_sources.sort();
        info!(
            "Applied language configuration: {} entries, {} changed sources",
            delta.updated,
            delta.changed_sources.len()
        );
        delta
    }

    /// Fetch and apply configuration. Concurrent callers wait for the refresh
    /// in progress and share its outcome instead of issuing another one.
    pub async fn refresh_from(
        &self,
        source: &dyn LanguageConfigSource,
    ) -> Result<ConfigurationDelta, VerseError> {
        let seen = self.refresh_generation.load(Ordering::SeqCst);
        let mut last = self.refresh_guard.lock().await;
        if self.refresh_generation.load(Ordering::SeqCst) != seen {
            if let Some(outcome) = last.as_ref() {
                debug!("Joined language refresh completed while waiting");
                return outcome.clone();
            }
        }

        let outcome = match source.active_languages().await {
            Ok(languages) => Ok(self.apply_configuration(languages)),
            Err(e) => {
                warn!("Language configuration refresh failed: {}", e);
                Err(e)
            }
        };
        *last = Some(outcome.clone());
        self.refresh_generation.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, LanguageEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, LanguageEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}
