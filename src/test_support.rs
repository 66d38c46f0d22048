//! Shared fixtures for unit tests

use crate::config::{LocalLanguage, VerseConfig};
use crate::downloader::{CachePolicy, FetchResponse, Fetcher};
use crate::error::VerseError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

pub const EN_URL: &str = "https://verses.test/data/verses_en.xml";
pub const ES_URL: &str = "https://verses.test/data/verses_es.xml";
pub const FR_URL: &str = "https://cdn.test/languages/fr.xml";

pub fn test_config() -> VerseConfig {
    VerseConfig {
        default_language: "en".into(),
        local_languages: vec![
            LocalLanguage {
                code: "en".into(),
                url: EN_URL.into(),
                bundled_path: PathBuf::from("verses/verses_en.xml"),
            },
            LocalLanguage {
                code: "es".into(),
                url: ES_URL.into(),
                bundled_path: PathBuf::from("verses/verses_es.xml"),
            },
        ],
        data_dir: PathBuf::from("/nonexistent/daily-verse-test"),
        languages_manifest_url: None,
        document_cache_capacity: 8,
        request_timeout_secs: 5,
        verify_sources: true,
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Document of `(text, reference, category)` triples
pub fn verses_xml(verses: &[(&str, &str, Option<&str>)]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<verses>\n");
    for (text, reference, category) in verses {
        xml.push_str("  <verse>");
        xml.push_str(&format!("<text>{}</text>", escape(text)));
        xml.push_str(&format!("<reference>{}</reference>", escape(reference)));
        if let Some(category) = category {
            xml.push_str(&format!("<category>{}</category>", escape(category)));
        }
        xml.push_str("</verse>\n");
    }
    xml.push_str("</verses>\n");
    xml
}

/// Document with one verse per reference; text is "Text of <reference>"
pub fn sample_xml(references: &[&str]) -> String {
    let texts: Vec<String> = references.iter().map(|r| format!("Text of {}", r)).collect();
    let verses: Vec<(&str, &str, Option<&str>)> = texts
        .iter()
        .zip(references)
        .map(|(t, r)| (t.as_str(), *r, None))
        .collect();
    verses_xml(&verses)
}

enum Scripted {
    Respond(u16, String),
    Fail,
}

/// Scripted fetcher. Unknown URLs answer 404. Query strings are ignored
/// when matching, so cache-busted URLs hit their base entry.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Respond(status, body.to_string()));
    }

    pub fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Scripted::Fail);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| Self::base(c) == url)
            .count()
    }

    fn base(url: &str) -> &str {
        url.split('?').next().unwrap_or(url)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, _policy: CachePolicy) -> Result<FetchResponse, VerseError> {
        self.calls.lock().unwrap().push(url.to_string());
        // Suspend like a real request so concurrent callers overlap
        tokio::task::yield_now().await;
        match self.routes.lock().unwrap().get(Self::base(url)) {
            Some(Scripted::Respond(status, body)) => Ok(FetchResponse {
                status: *status,
                body: body.clone(),
            }),
            Some(Scripted::Fail) => Err(VerseError::Load(format!("{}: connection refused", url))),
            None => Ok(FetchResponse {
                status: 404,
                body: String::new(),
            }),
        }
    }

    async fn exists(&self, url: &str) -> Result<bool, VerseError> {
        Ok(matches!(
            self.routes.lock().unwrap().get(Self::base(url)),
            Some(Scripted::Respond(200..=299, _))
        ))
    }
}

/// Loader over a memory store with `fr` configured as an active remote
/// language
pub fn test_loader(fetcher: std::sync::Arc<MockFetcher>) -> crate::loader::DocumentLoader {
    use crate::cache::DocumentCache;
    use crate::registry::{LanguageRegistry, RemoteLanguage};
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    let config = Arc::new(test_config());
    let registry = Arc::new(LanguageRegistry::new(&config));
    registry.apply_configuration(vec![RemoteLanguage {
        code: "fr".into(),
        url: FR_URL.into(),
        is_active: true,
    }]);
    let cache = Arc::new(DocumentCache::new(Arc::new(MemoryStore::new()), 8));
    crate::loader::DocumentLoader::new(config, registry, cache, fetcher, None)
}
