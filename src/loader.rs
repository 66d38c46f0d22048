//! Loading per-language verse documents with fallback to the default language
//!
//! Lookup order: memory cache, persisted copy, network. A non-default
//! language whose document cannot be fetched or parsed is disabled and the
//! default language is loaded in its place. Only a failure of the default
//! language reaches the caller.

use crate::cache::{DocumentCache, VerseDocument};
use crate::config::VerseConfig;
use crate::downloader::{cache_busted_url, CachePolicy, FetchResponse, Fetcher};
use crate::error::VerseError;
use crate::parser::parse_verses;
use crate::registry::{LanguageConfigSource, LanguageRegistry, Substitution};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

type SharedLoad = Shared<BoxFuture<'static, Result<VerseDocument, VerseError>>>;

/// Cheap to clone; clones share caches and in-flight loads
#[derive(Clone)]
pub struct DocumentLoader {
    config: Arc<VerseConfig>,
    registry: Arc<LanguageRegistry>,
    cache: Arc<DocumentCache>,
    fetcher: Arc<dyn Fetcher>,
    config_source: Option<Arc<dyn LanguageConfigSource>>,
    in_flight: Arc<Mutex<HashMap<String, (u64, SharedLoad)>>>,
    next_load_id: Arc<AtomicU64>,
}

impl DocumentLoader {
    pub fn new(
        config: Arc<VerseConfig>,
        registry: Arc<LanguageRegistry>,
        cache: Arc<DocumentCache>,
        fetcher: Arc<dyn Fetcher>,
        config_source: Option<Arc<dyn LanguageConfigSource>>,
    ) -> Self {
        Self {
            config,
            registry,
            cache,
            fetcher,
            config_source,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_load_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn registry(&self) -> &Arc<LanguageRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<DocumentCache> {
        &self.cache
    }

    /// Load the document for `code` (default language when `None`).
    ///
    /// Concurrent loads of the same code share a single fetch.
    pub async fn load(&self, code: Option<&str>) -> Result<VerseDocument, VerseError> {
        let code = code.unwrap_or(self.registry.default_code()).to_string();
        self.shared_load(&code).await
    }

    /// Number of languages with a load in progress
    pub fn pending_loads(&self) -> usize {
        self.pending().len()
    }

    /// HEAD-check the registered source of `code`
    pub async fn source_exists(&self, code: &str) -> bool {
        let resolution = self.registry.resolve(code);
        if resolution.is_substituted() {
            return false;
        }
        match self.fetcher.exists(&resolution.url).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Existence check for '{}' failed: {}", code, e);
                false
            }
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, (u64, SharedLoad)>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn shared_load(&self, code: &str) -> SharedLoad {
        let mut pending = self.pending();
        if let Some((_, load)) = pending.get(code) {
            debug!("Joining in-flight load for '{}'", code);
            return load.clone();
        }

        let id = self.next_load_id.fetch_add(1, Ordering::SeqCst);
        let this = self.clone();
        let key = code.to_string();
        let load = async move {
            let result = this.load_uncached(&key).await;
            this.finish_load(&key, id);
            result
        }
        .boxed()
        .shared();

        pending.insert(code.to_string(), (id, load.clone()));
        load
    }

    fn finish_load(&self, code: &str, id: u64) {
        let mut pending = self.pending();
        if pending.get(code).map(|(current, _)| *current == id).unwrap_or(false) {
            pending.remove(code);
        }
    }

    async fn load_uncached(&self, code: &str) -> Result<VerseDocument, VerseError> {
        let default = self.registry.default_code().to_string();
        let resolution = self.registry.resolve(code);

        if let Some(reason) = resolution.substitution {
            warn!(
                "Language '{}' unavailable ({:?}); using '{}'",
                code, reason, resolution.code
            );
            if matches!(reason, Substitution::Unknown | Substitution::MissingUrl) {
                self.registry.disable(code);
            }
            return self.shared_load(&default).await;
        }

        if let Some(document) = self.cache.get(code) {
            return Ok(document);
        }

        if let Some(document) = self.cache.try_load_persisted(code, &resolution.url) {
            info!("Loaded '{}' from persisted storage", code);
            self.cache.set(code, document.clone());
            return Ok(document);
        }

        let response = match self.fetch_source(code, &resolution.url).await {
            Ok(response) => response,
            Err(e) => return self.fail_over(code, e).await,
        };

        match parse_verses(&response.body) {
            Ok(records) => {
                info!("Loaded {} verses for '{}'", records.len(), code);
                self.cache.persist(code, &resolution.url, &response.body);
                let document: VerseDocument = Arc::new(records);
                self.cache.set(code, document.clone());
                Ok(document)
            }
            Err(e) => self.fail_over(code, e).await,
        }
    }

    /// Fetch the raw document. Local languages try their bundled copy first;
    /// remote sources are fetched with cache busting.
    async fn fetch_source(&self, code: &str, url: &str) -> Result<FetchResponse, VerseError> {
        if self.registry.is_local(code) {
            if let Some(bundled) = self.config.bundled_url(code) {
                match self.fetcher.fetch(&bundled, CachePolicy::Default).await {
                    Ok(response) if response.is_success() => return Ok(response),
                    Ok(response) => debug!(
                        "Bundled document for '{}' unavailable (HTTP {}); trying {}",
                        code, response.status, url
                    ),
                    Err(e) => debug!(
                        "Bundled document for '{}' unavailable ({}); trying {}",
                        code, e, url
                    ),
                }
            }
            let response = self.fetcher.fetch(url, CachePolicy::Default).await?;
            return Self::check_status(url, response);
        }

        let busted = cache_busted_url(url, chrono::Utc::now().timestamp_millis());
        let response = self.fetcher.fetch(&busted, CachePolicy::NoCache).await?;
        Self::check_status(url, response)
    }

    fn check_status(url: &str, response: FetchResponse) -> Result<FetchResponse, VerseError> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(VerseError::Load(format!("{}: HTTP {}", url, response.status)))
        }
    }

    async fn fail_over(&self, code: &str, error: VerseError) -> Result<VerseDocument, VerseError> {
        let default = self.registry.default_code().to_string();
        if code == default {
            warn!("Default language '{}' failed to load: {}", code, error);
            return Err(error);
        }

        warn!("Language '{}' failed to load ({}); falling back to '{}'", code, error, default);
        if self.registry.disable(code) {
            self.cache.clear(code);
            self.record_disablement(code).await;
        }
        self.shared_load(&default).await
    }

    /// Best-effort write-back of a disablement to the configuration source
    async fn record_disablement(&self, code: &str) {
        let Some(source) = self.config_source.as_ref() else {
            return;
        };
        match source.set_language_active(code, false).await {
            Ok(true) => info!("Recorded '{}' as inactive in language configuration", code),
            Ok(false) => debug!("Language configuration did not record '{}'", code),
            Err(e) => warn!("Failed to record '{}' as inactive: {}", code, e),
        }
    }
}
