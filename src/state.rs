//! Application state management

use crate::bookmarks::BookmarkStore;
use crate::cache::DocumentCache;
use crate::config::VerseConfig;
use crate::downloader::{Fetcher, HttpFetcher, ManifestConfigSource};
use crate::error::VerseError;
use crate::history::RecentVerses;
use crate::loader::DocumentLoader;
use crate::preferences::PreferencesStore;
use crate::registry::{ConfigurationDelta, LanguageConfigSource, LanguageEvent, LanguageRegistry};
use crate::repository::VerseRepository;
use crate::selector::VerseSelector;
use crate::storage::{KeyValueStore, SqliteStore};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Result of preparing every available language for offline use
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OfflineReport {
    pub ready: Vec<String>,
    pub failed: Vec<String>,
}

/// Everything the application needs, constructed once at startup
pub struct AppState {
    pub config: Arc<VerseConfig>,
    pub store: Arc<dyn KeyValueStore>,
    pub registry: Arc<LanguageRegistry>,
    pub cache: Arc<DocumentCache>,
    pub loader: DocumentLoader,
    pub repository: VerseRepository,
    pub recent: RecentVerses,
    pub bookmarks: BookmarkStore,
    pub preferences: PreferencesStore,
    config_source: Option<Arc<dyn LanguageConfigSource>>,
}

impl AppState {
    /// Initialize application state backed by the settings database
    pub fn new(config: VerseConfig) -> Result<Self> {
        config.validate()?;

        let settings_db_path = config.settings_db_path();
        let store = SqliteStore::open(&settings_db_path).with_context(|| {
            format!("Failed to open settings database {}", settings_db_path.display())
        })?;

        let timeout = Duration::from_secs(config.request_timeout_secs);
        let fetcher = HttpFetcher::new(timeout).context("Failed to build HTTP client")?;
        let config_source: Option<Arc<dyn LanguageConfigSource>> =
            match &config.languages_manifest_url {
                Some(url) => Some(Arc::new(
                    ManifestConfigSource::new(url.clone(), timeout)
                        .context("Failed to build manifest client")?,
                )),
                None => None,
            };

        Ok(Self::with_parts(
            config,
            Arc::new(store),
            Arc::new(fetcher),
            config_source,
        ))
    }

    /// Assemble state from explicit collaborators
    pub fn with_parts(
        config: VerseConfig,
        store: Arc<dyn KeyValueStore>,
        fetcher: Arc<dyn Fetcher>,
        config_source: Option<Arc<dyn LanguageConfigSource>>,
    ) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(LanguageRegistry::new(&config));
        let cache = Arc::new(DocumentCache::new(
            store.clone(),
            config.document_cache_capacity,
        ));
        let loader = DocumentLoader::new(
            config.clone(),
            registry.clone(),
            cache.clone(),
            fetcher,
            config_source.clone(),
        );
        let repository = VerseRepository::new(loader.clone(), VerseSelector::new());
        let preferences = PreferencesStore::new(store.clone());

        if let Some(code) = preferences.language() {
            info!("Restoring language preference '{}'", code);
            repository.set_language(&code);
        }

        Self {
            recent: RecentVerses::new(store.clone()),
            bookmarks: BookmarkStore::new(store.clone()),
            preferences,
            config,
            store,
            registry,
            cache,
            loader,
            repository,
            config_source,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LanguageEvent> {
        self.registry.subscribe()
    }

    /// Switch language and remember the choice
    pub fn set_language(&self, code: &str) {
        self.repository.set_language(code);
        if let Err(e) = self.preferences.set_language(code) {
            warn!("Failed to save language preference: {}", e);
        }
    }

    /// Pull the latest language configuration and drop documents whose
    /// source changed. Without a configuration source this is a no-op.
    pub async fn refresh_languages(&self) -> Result<ConfigurationDelta, VerseError> {
        let Some(source) = &self.config_source else {
            return Ok(ConfigurationDelta::default());
        };
        let delta = self.registry.refresh_from(source.as_ref()).await?;

        for code in &delta.changed_sources {
            self.cache.clear(code);
            self.repository.forget_language(code);
        }

        if self.config.verify_sources {
            for code in &delta.changed_sources {
                // Deactivated or removed languages are not checked
                if self.registry.resolve(code).is_substituted() {
                    continue;
                }
                if self.loader.source_exists(code).await {
                    continue;
                }
                warn!("Source for '{}' does not exist; disabling", code);
                if self.registry.disable(code) {
                    if let Err(e) = source.set_language_active(code, false).await {
                        warn!("Failed to record disablement of '{}': {}", code, e);
                    }
                }
            }
        }

        Ok(delta)
    }

    /// Drop every cached document, in memory and persisted
    pub fn clear_cache(&self) {
        self.cache.clear_all();
        self.repository.clear();
        info!("Cleared verse cache");
    }

    /// Load every available language so each one is persisted locally
    pub async fn prepare_offline(&self) -> OfflineReport {
        let mut report = OfflineReport::default();
        for code in self.registry.available_codes() {
            let loaded = self.loader.load(Some(&code)).await;
            // A failed non-default load falls back and disables the code
            if loaded.is_ok() && !self.registry.is_disabled(&code) {
                report.ready.push(code);
            } else {
                report.failed.push(code);
            }
        }
        info!(
            "Offline preparation: {} ready, {} failed",
            report.ready.len(),
            report.failed.len()
        );
        report
    }
}
