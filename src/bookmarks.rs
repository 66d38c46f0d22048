//! Bookmarked verses, with collections and notes
//!
//! At most one bookmark per reference: adding an existing reference updates
//! it in place.

use crate::error::VerseError;
use crate::storage::KeyValueStore;
use crate::verse::VerseRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

const BOOKMARKS_KEY: &str = "bookmarks";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkEntry {
    pub verse_text: String,
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub collections: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl BookmarkEntry {
    pub fn from_verse(verse: &VerseRecord) -> Self {
        Self {
            verse_text: verse.text.clone(),
            reference: verse.reference.clone(),
            category: verse.categories.first().cloned(),
            collections: BTreeSet::new(),
            notes: None,
            timestamp: Utc::now(),
        }
    }
}

pub struct BookmarkStore {
    store: Arc<dyn KeyValueStore>,
}

impl BookmarkStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Newest first
    pub fn list(&self) -> Vec<BookmarkEntry> {
        let mut entries: Vec<BookmarkEntry> = match self.store.get(BOOKMARKS_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable bookmarks: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read bookmarks: {}", e);
                Vec::new()
            }
        };
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }

    fn save(&self, entries: &[BookmarkEntry]) -> Result<(), VerseError> {
        let raw = serde_json::to_string(entries)?;
        self.store.set(BOOKMARKS_KEY, &raw)
    }

    fn update<F>(&self, reference: &str, apply: F) -> Result<bool, VerseError>
    where
        F: FnOnce(&mut BookmarkEntry),
    {
        let mut entries = self.list();
        match entries.iter_mut().find(|e| e.reference == reference) {
            Some(entry) => {
                apply(entry);
                self.save(&entries)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn get(&self, reference: &str) -> Option<BookmarkEntry> {
        self.list().into_iter().find(|e| e.reference == reference)
    }

    pub fn is_bookmarked(&self, reference: &str) -> bool {
        self.get(reference).is_some()
    }

    /// Insert or update. On update, collections are merged and existing
    /// notes are kept unless `entry` brings new ones.
    pub fn add(&self, entry: BookmarkEntry) -> Result<BookmarkEntry, VerseError> {
        let mut entries = self.list();
        let stored = match entries.iter_mut().find(|e| e.reference == entry.reference) {
            Some(existing) => {
                debug!("Updating bookmark for {}", entry.reference);
                existing.verse_text = entry.verse_text;
                existing.category = entry.category.or(existing.category.take());
                existing.collections.extend(entry.collections);
                if entry.notes.is_some() {
                    existing.notes = entry.notes;
                }
                existing.timestamp = entry.timestamp;
                existing.clone()
            }
            None => {
                entries.push(entry.clone());
                entry
            }
        };
        self.save(&entries)?;
        Ok(stored)
    }

    pub fn remove(&self, reference: &str) -> Result<bool, VerseError> {
        let mut entries = self.list();
        let before = entries.len();
        entries.retain(|e| e.reference != reference);
        if entries.len() == before {
            return Ok(false);
        }
        self.save(&entries)?;
        Ok(true)
    }

    /// Set or clear the notes of an existing bookmark
    pub fn set_notes(&self, reference: &str, notes: Option<String>) -> Result<bool, VerseError> {
        let notes = notes.filter(|n| !n.trim().is_empty());
        self.update(reference, |entry| entry.notes = notes)
    }

    pub fn add_to_collection(&self, reference: &str, collection: &str) -> Result<bool, VerseError> {
        let name = collection.trim();
        if name.is_empty() {
            return Err(VerseError::InvalidInput("collection name is empty".into()));
        }
        self.update(reference, |entry| {
            entry.collections.insert(name.to_string());
        })
    }

    pub fn remove_from_collection(
        &self,
        reference: &str,
        collection: &str,
    ) -> Result<bool, VerseError> {
        self.update(reference, |entry| {
            entry.collections.remove(collection);
        })
    }

    /// All collection names in use
    pub fn collections(&self) -> BTreeSet<String> {
        self.list()
            .into_iter()
            .flat_map(|e| e.collections.into_iter())
            .collect()
    }

    pub fn in_collection(&self, collection: &str) -> Vec<BookmarkEntry> {
        self.list()
            .into_iter()
            .filter(|e| e.collections.contains(collection))
            .collect()
    }

    /// Rename a collection on every bookmark; returns bookmarks touched
    pub fn rename_collection(&self, from: &str, to: &str) -> Result<usize, VerseError> {
        let to = to.trim();
        if to.is_empty() {
            return Err(VerseError::InvalidInput("collection name is empty".into()));
        }
        let mut entries = self.list();
        let mut touched = 0;
        for entry in entries.iter_mut() {
            if entry.collections.remove(from) {
                entry.collections.insert(to.to_string());
                touched += 1;
            }
        }
        if touched > 0 {
            self.save(&entries)?;
        }
        Ok(touched)
    }

    /// Remove a collection; the bookmarks themselves stay
    pub fn delete_collection(&self, collection: &str) -> Result<usize, VerseError> {
        let mut entries = self.list();
        let mut touched = 0;
        for entry in entries.iter_mut() {
            if entry.collections.remove(collection) {
                touched += 1;
            }
        }
        if touched > 0 {
            self.save(&entries)?;
        }
        Ok(touched)
    }
}
