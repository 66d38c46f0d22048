//! Verse record type and the category list

use serde::{Deserialize, Serialize};

/// Sentinel category meaning "no filter"
pub const ALL_CATEGORIES: &str = "All";

/// Categories offered to the UI. Not derived from loaded data; see
/// `VerseRepository::categories_in_use` for that.
pub const CATEGORIES: &[&str] = &[
    ALL_CATEGORIES,
    "Faith",
    "Hope",
    "Love",
    "Peace",
    "Strength",
    "Wisdom",
    "Comfort",
    "Guidance",
    "Gratitude",
    "Forgiveness",
    "Courage",
    "Joy",
    "Prayer",
    "Salvation",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerseRecord {
    pub text: String,
    pub reference: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl VerseRecord {
    pub fn new(text: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reference: reference.into(),
            categories: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    /// Case-insensitive category membership
    pub fn in_category(&self, category: &str) -> bool {
        let wanted = category.to_lowercase();
        self.categories.iter().any(|c| c.to_lowercase() == wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_category_ignores_case() {
        let verse = VerseRecord::new("For God so loved", "John 3:16").with_category("Love");
        assert!(verse.in_category("love"));
        assert!(verse.in_category("LOVE"));
        assert!(!verse.in_category("Hope"));
    }

    #[test]
    fn test_categories_start_with_sentinel() {
        assert_eq!(CATEGORIES[0], ALL_CATEGORIES);
    }
}
