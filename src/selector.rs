//! Verse selection: random picks that avoid immediate repeats, and search
//! result ranking

use crate::verse::VerseRecord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex_lite::Regex;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Search scoring table
pub const SCORE_REFERENCE_EXACT: u32 = 100;
pub const SCORE_REFERENCE_CONTAINS: u32 = 50;
pub const SCORE_REFERENCE_PREFIX: u32 = 20;
pub const SCORE_TEXT_EXACT: u32 = 50;
pub const SCORE_TEXT_CONTAINS: u32 = 30;
pub const SCORE_TEXT_WHOLE_WORD: u32 = 15;
pub const SCORE_CATEGORY: u32 = 20;

pub struct VerseSelector {
    rng: Mutex<StdRng>,
    last_served: Mutex<HashMap<String, usize>>,
}

impl Default for VerseSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl VerseSelector {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic selector for tests and reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            last_served: Mutex::new(HashMap::new()),
        }
    }

    fn last_served(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.last_served.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Uniformly random record, never the one last served under `key`
    /// unless it is the only record.
    pub fn pick_random_avoiding_repeat(
        &self,
        records: &[VerseRecord],
        key: &str,
    ) -> Option<VerseRecord> {
        let index = match records.len() {
            0 => return None,
            1 => 0,
            len => {
                let last = self.last_served().get(key).copied();
                let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                loop {
                    let candidate = rng.gen_range(0..len);
                    if Some(candidate) != last {
                        break candidate;
                    }
                }
            }
        };
        self.last_served().insert(key.to_string(), index);
        records.get(index).cloned()
    }

    /// Forget every last-served index
    pub fn reset(&self) {
        self.last_served().clear();
    }
}

fn literal(query: &str) -> Option<Regex> {
    Regex::new(&regex_lite::escape(query)).ok()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Some match of `pattern` in `text` has no word character on either side.
/// Checked on chars so accented letters count as part of a word.
fn matches_whole_word(pattern: &Regex, text: &str) -> bool {
    pattern.find_iter(text).any(|m| {
        let before = text[..m.start()].chars().next_back();
        let after = text[m.end()..].chars().next();
        !before.map_or(false, is_word_char) && !after.map_or(false, is_word_char)
    })
}

/// Relevance of `record` for an already lowercased, trimmed `query`
pub fn score_record(record: &VerseRecord, query: &str) -> u32 {
    score_with(record, query, literal(query).as_ref())
}

fn score_with(record: &VerseRecord, query: &str, word: Option<&Regex>) -> u32 {
    let mut score = 0;

    let reference = record.reference.to_lowercase();
    if reference == query {
        score += SCORE_REFERENCE_EXACT;
    }
    if reference.contains(query) {
        score += SCORE_REFERENCE_CONTAINS;
        if reference.starts_with(query) {
            score += SCORE_REFERENCE_PREFIX;
        }
    }

    let text = record.text.to_lowercase();
    if text == query {
        score += SCORE_TEXT_EXACT;
    }
    if text.contains(query) {
        score += SCORE_TEXT_CONTAINS;
        if word.map_or(false, |w| matches_whole_word(w, &text)) {
            score += SCORE_TEXT_WHOLE_WORD;
        }
    }

    if record
        .categories
        .iter()
        .map(|c| c.to_lowercase())
        .any(|c| c == query || c.contains(query))
    {
        score += SCORE_CATEGORY;
    }

    score
}

/// Records with a non-zero score, best first. Ties keep input order.
pub fn rank_search_results(records: &[VerseRecord], query: &str) -> Vec<VerseRecord> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }
    let word = literal(&query);

    let mut scored: Vec<(u32, &VerseRecord)> = records
        .iter()
        .map(|r| (score_with(r, &query, word.as_ref()), r))
        .filter(|(score, _)| *score > 0)
        .collect();
    // sort_by is stable
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, r)| r.clone()).collect()
}
