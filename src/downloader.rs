//! Fetching verse documents and the remote language manifest
//!
//! `http(s)://` sources go through reqwest; `file://` sources (bundled
//! documents of local languages) are read from disk.

use crate::error::VerseError;
use crate::registry::{LanguageConfigSource, RemoteLanguage};
use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Let intermediaries serve cached copies
    Default,
    /// Ask every cache on the way to revalidate
    NoCache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network transport. `Err` means the request never produced a response.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, policy: CachePolicy) -> Result<FetchResponse, VerseError>;

    /// HEAD-style existence check
    async fn exists(&self, url: &str) -> Result<bool, VerseError>;
}

/// Append a `t=<millis>` query parameter so remote edits are seen promptly
pub fn cache_busted_url(url: &str, millis: i64) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}t={}", url, separator, millis)
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, VerseError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerseError::Load(e.to_string()))?;
        Ok(Self { client })
    }

    async fn read_file(path: &str) -> Result<FetchResponse, VerseError> {
        match tokio::fs::read_to_string(path).await {
            Ok(body) => Ok(FetchResponse { status: 200, body }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FetchResponse {
                status: 404,
                body: String::new(),
            }),
            Err(e) => Err(VerseError::Load(format!("{}: {}", path, e))),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, policy: CachePolicy) -> Result<FetchResponse, VerseError> {
        if let Some(path) = url.strip_prefix("file://") {
            return Self::read_file(path).await;
        }

        let mut request = self.client.get(url);
        if policy == CachePolicy::NoCache {
            request = request
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
        }

        let response = request
            .send()
            .await
            .map_err(|e| VerseError::Load(format!("{}: {}", url, e)))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| VerseError::Load(format!("{}: {}", url, e)))?;
        debug!("GET {} -> {} ({} bytes)", url, status, body.len());

        Ok(FetchResponse { status, body })
    }

    async fn exists(&self, url: &str) -> Result<bool, VerseError> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(tokio::fs::metadata(path).await.is_ok());
        }
        let response = self
            .client
            .head(url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| VerseError::Load(format!("{}: {}", url, e)))?;
        Ok(response.status().is_success())
    }
}

/// Remote manifest listing administratively configured languages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguagesManifest {
    pub languages: Vec<RemoteLanguage>,
}

/// Read-only configuration source backed by a JSON manifest
pub struct ManifestConfigSource {
    client: reqwest::Client,
    url: String,
}

impl ManifestConfigSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, VerseError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerseError::Load(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl LanguageConfigSource for ManifestConfigSource {
    async fn active_languages(&self) -> Result<Vec<RemoteLanguage>, VerseError> {
        let url = cache_busted_url(&self.url, chrono::Utc::now().timestamp_millis());
        let response = self
            .client
            .get(&url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| VerseError::Load(format!("Failed to fetch language manifest: {}", e)))?;

        if !response.status().is_success() {
            return Err(VerseError::Load(format!(
                "Failed to fetch language manifest: HTTP {}",
                response.status()
            )));
        }

        let manifest: LanguagesManifest = response
            .json()
            .await
            .map_err(|e| VerseError::Config(format!("Failed to parse language manifest: {}", e)))?;
        Ok(manifest.languages)
    }

    async fn set_language_active(&self, code: &str, active: bool) -> Result<bool, VerseError> {
        info!(
            "Language manifest is read-only; not recording '{}' active={}",
            code, active
        );
        Ok(false)
    }
}
