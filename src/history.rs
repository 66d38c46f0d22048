//! Recently viewed verses

use crate::storage::KeyValueStore;
use crate::verse::VerseRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

const RECENT_KEY: &str = "recent_verses";

/// Keep only the last 10 entries
pub const MAX_RECENT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentVerseEntry {
    pub verse_text: String,
    pub reference: String,
    pub timestamp: DateTime<Utc>,
}

pub struct RecentVerses {
    store: Arc<dyn KeyValueStore>,
}

impl RecentVerses {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Newest first. An unreadable list is treated as empty.
    pub fn list(&self) -> Vec<RecentVerseEntry> {
        match self.store.get(RECENT_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable recent verses: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read recent verses: {}", e);
                Vec::new()
            }
        }
    }

    fn save(&self, entries: &[RecentVerseEntry]) {
        let result = serde_json::to_string(entries)
            .map_err(crate::error::VerseError::from)
            .and_then(|raw| self.store.set(RECENT_KEY, &raw));
        if let Err(e) = result {
            warn!("Failed to save recent verses: {}", e);
        }
    }

    /// Record `verse` as just viewed. A verse already in the list moves to
    /// the front with a fresh timestamp.
    pub fn add(&self, verse: &VerseRecord) -> Vec<RecentVerseEntry> {
        let mut entries = self.list();
        entries.retain(|e| e.reference != verse.reference);
        entries.insert(
            0,
            RecentVerseEntry {
                verse_text: verse.text.clone(),
                reference: verse.reference.clone(),
                timestamp: Utc::now(),
            },
        );
        entries.truncate(MAX_RECENT);
        self.save(&entries);
        entries
    }

    pub fn remove(&self, reference: &str) -> Vec<RecentVerseEntry> {
        let mut entries = self.list();
        entries.retain(|e| e.reference != reference);
        self.save(&entries);
        entries
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(RECENT_KEY) {
            warn!("Failed to clear recent verses: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn verse(reference: &str) -> VerseRecord {
        VerseRecord::new(format!("Text of {}", reference), reference)
    }

    #[test]
    fn test_readding_moves_to_front() {
        let recent = RecentVerses::new(Arc::new(MemoryStore::new()));
        recent.add(&verse("John 3:16"));
        let first_seen = recent.list()[0].timestamp;
        recent.add(&verse("Psalm 23:1"));
        let entries = recent.add(&verse("John 3:16"));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].reference, "John 3:16");
        assert_eq!(entries[1].reference, "Psalm 23:1");
        assert!(entries[0].timestamp >= first_seen);
        assert_eq!(recent.list(), entries);
    }

    #[test]
    fn test_capped_at_ten() {
        let recent = RecentVerses::new(Arc::new(MemoryStore::new()));
        for i in 0..15 {
            recent.add(&verse(&format!("Psalm {}:1", i)));
        }
        let entries = recent.list();
        assert_eq!(entries.len(), MAX_RECENT);
        assert_eq!(entries[0].reference, "Psalm 14:1");
        assert_eq!(entries[9].reference, "Psalm 5:1");
    }

    #[test]
    fn test_remove_clear_and_corrupt_data() {
        let store = Arc::new(MemoryStore::new());
        let recent = RecentVerses::new(store.clone());
        recent.add(&verse("John 3:16"));
        recent.add(&verse("Psalm 23:1"));
        assert_eq!(recent.remove("John 3:16").len(), 1);

        recent.clear();
        assert!(recent.list().is_empty());

        store.set(RECENT_KEY, "{broken").unwrap();
        assert!(recent.list().is_empty());
    }

    #[test]
    fn test_failed_write_keeps_going() {
        let recent = RecentVerses::new(Arc::new(MemoryStore::with_quota(8)));
        let entries = recent.add(&verse("John 3:16"));
        assert_eq!(entries.len(), 1);
        assert!(recent.list().is_empty());
    }
}
