//! Daily Verse - multilingual verse delivery
//!
//! Loads per-language verse documents with caching and fallback to the
//! default language, and serves random, category, reference and search
//! lookups over them.

pub mod error;
pub mod verse;
pub mod config;
pub mod storage;
pub mod parser;
pub mod cache;
pub mod registry;
pub mod downloader;
pub mod loader;
pub mod selector;
pub mod repository;
pub mod history;
pub mod bookmarks;
pub mod preferences;
pub mod state;

#[cfg(test)]
mod test_support;

pub use error::VerseError;
pub use state::{AppState, OfflineReport};
pub use verse::{VerseRecord, ALL_CATEGORIES, CATEGORIES};
pub use config::{get_data_dir, LocalLanguage, VerseConfig};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
pub use parser::parse_verses;
pub use cache::{DocumentCache, VerseDocument};
pub use registry::{
    ConfigurationDelta, LanguageConfigSource, LanguageEntry, LanguageEvent, LanguageRegistry,
    RemoteLanguage, Resolution, StaticConfigSource, Substitution,
};
pub use downloader::{CachePolicy, FetchResponse, Fetcher, HttpFetcher, ManifestConfigSource};
pub use loader::DocumentLoader;
pub use selector::{rank_search_results, VerseSelector};
pub use repository::{Selection, VerseRepository};
pub use history::{RecentVerseEntry, RecentVerses};
pub use bookmarks::{BookmarkEntry, BookmarkStore};
pub use preferences::PreferencesStore;
