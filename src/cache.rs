//! Per-language document cache: LRU in memory, raw XML in persisted storage

use crate::parser::parse_verses;
use crate::storage::KeyValueStore;
use crate::verse::VerseRecord;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Parsed verse document shared between the cache, the loader and callers
pub type VerseDocument = Arc<Vec<VerseRecord>>;

/// Storage key prefix for persisted raw documents
pub const PERSISTED_PREFIX: &str = "verses_xml_";

const DEFAULT_CAPACITY: usize = 16;

/// Envelope stored under `verses_xml_<code>`
#[derive(Debug, Serialize, Deserialize)]
struct PersistedDocument {
    source: String,
    sha256: String,
    xml: String,
}

fn checksum(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

pub fn persisted_key(code: &str) -> String {
    format!("{}{}", PERSISTED_PREFIX, code)
}

pub struct DocumentCache {
    memory: Mutex<LruCache<String, VerseDocument>>,
    store: Arc<dyn KeyValueStore>,
}

impl DocumentCache {
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            memory: Mutex::new(LruCache::new(capacity)),
            store,
        }
    }

    fn memory(&self) -> MutexGuard<'_, LruCache<String, VerseDocument>> {
        self.memory.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// In-memory lookup only
    pub fn get(&self, code: &str) -> Option<VerseDocument> {
        self.memory().get(code).cloned()
    }

    pub fn set(&self, code: &str, document: VerseDocument) {
        self.memory().put(code.to_string(), document);
    }

    /// Drop the in-memory entry and the persisted copy for `code`
    pub fn clear(&self, code: &str) {
        self.memory().pop(code);
        if let Err(e) = self.store.remove(&persisted_key(code)) {
            warn!("Failed to remove persisted document for '{}': {}", code, e);
        }
    }

    /// Drop every in-memory entry and every persisted document
    pub fn clear_all(&self) {
        self.memory().clear();
        match self.store.keys() {
            Ok(keys) => {
                for key in keys.iter().filter(|k| k.starts_with(PERSISTED_PREFIX)) {
                    if let Err(e) = self.store.remove(key) {
                        warn!("Failed to remove persisted document '{}': {}", key, e);
                    }
                }
            }
            Err(e) => warn!("Failed to list persisted documents: {}", e),
        }
    }

    /// Restore a persisted document fetched from `source`.
    ///
    /// A copy that fails its checksum, came from another source or does not
    /// parse is deleted and reported as a miss.
    pub fn try_load_persisted(&self, code: &str, source: &str) -> Option<VerseDocument> {
        let key = persisted_key(code);
        let raw = match self.store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read persisted document for '{}': {}", code, e);
                return None;
            }
        };

        let problem = match serde_json::from_str::<PersistedDocument>(&raw) {
            Err(e) => format!("unreadable envelope: {}", e),
            Ok(doc) if doc.sha256 != checksum(&doc.xml) => "checksum mismatch".to_string(),
            Ok(doc) if doc.source != source => {
                format!("source changed from {} to {}", doc.source, source)
            }
            Ok(doc) => match parse_verses(&doc.xml) {
                Ok(records) => {
                    debug!("Restored {} verses for '{}' from storage", records.len(), code);
                    return Some(Arc::new(records));
                }
                Err(e) => e.to_string(),
            },
        };

        warn!("Discarding persisted document for '{}': {}", code, problem);
        if let Err(e) = self.store.remove(&key) {
            warn!("Failed to remove persisted document for '{}': {}", code, e);
        }
        None
    }

    /// Best-effort write of the raw document; failures are logged only
    pub fn persist(&self, code: &str, source: &str, raw: &str) {
        let envelope = PersistedDocument {
            source: source.to_string(),
            sha256: checksum(raw),
            xml: raw.to_string(),
        };
        let serialized = match serde_json::to_string(&envelope) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize document for '{}': {}", code, e);
                return;
            }
        };
        if let Err(e) = self.store.set(&persisted_key(code), &serialized) {
            warn!("Failed to persist document for '{}': {}", code, e);
        }
    }

    pub fn stats(&self) -> (usize, usize) {
        let memory = self.memory();
        (memory.len(), memory.cap().get())
    }
}
