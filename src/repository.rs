//! Verse repository: the API the UI layer calls

use crate::cache::VerseDocument;
use crate::error::VerseError;
use crate::loader::DocumentLoader;
use crate::registry::LanguageEvent;
use crate::selector::{rank_search_results, VerseSelector};
use crate::verse::{VerseRecord, ALL_CATEGORIES, CATEGORIES};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

pub const MAX_SEARCH_RESULTS: usize = 20;
pub const MIN_QUERY_CHARS: usize = 2;

/// A selected verse, and whether the requested filter matched nothing so a
/// random verse was served instead
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub verse: VerseRecord,
    pub fell_back: bool,
}

fn selection_key(code: &str, category: &str) -> String {
    format!("{}:{}", code, category.to_lowercase())
}

pub struct VerseRepository {
    loader: DocumentLoader,
    selector: VerseSelector,
    language: RwLock<String>,
    verses: Mutex<HashMap<String, VerseDocument>>,
    by_category: Mutex<HashMap<String, Arc<Vec<VerseRecord>>>>,
}

impl VerseRepository {
    pub fn new(loader: DocumentLoader, selector: VerseSelector) -> Self {
        let language = loader.registry().default_code().to_string();
        Self {
            loader,
            selector,
            language: RwLock::new(language),
            verses: Mutex::new(HashMap::new()),
            by_category: Mutex::new(HashMap::new()),
        }
    }

    pub fn language(&self) -> String {
        self.language.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Switch the current language. Does not load anything.
    pub fn set_language(&self, code: &str) {
        let previous = {
            let mut language = self.language.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *language, code.to_string())
        };
        if previous != code {
            info!("Language changed from '{}' to '{}'", previous, code);
            self.loader.registry().notify(LanguageEvent::Changed {
                from: previous,
                to: code.to_string(),
            });
        }
    }

    pub fn get_categories(&self) -> &'static [&'static str] {
        CATEGORIES
    }

    fn code(&self, language: Option<&str>) -> String {
        language.map(str::to_string).unwrap_or_else(|| self.language())
    }

    fn verses(&self) -> MutexGuard<'_, HashMap<String, VerseDocument>> {
        self.verses.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn by_category(&self) -> MutexGuard<'_, HashMap<String, Arc<Vec<VerseRecord>>>> {
        self.by_category.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn get_all_verses(&self, language: Option<&str>) -> Result<VerseDocument, VerseError> {
        let code = self.code(language);
        let registry = self.loader.registry();
        let cached = self.verses().get(&code).cloned();
        if let Some(document) = cached {
            if !registry.resolve(&code).is_substituted() {
                return Ok(document);
            }
            debug!("'{}' is no longer available; dropping its cached verses", code);
            self.forget_language(&code);
        }

        let document = self.loader.load(Some(&code)).await?;

        if document.is_empty() && code != registry.default_code() {
            debug!("'{}' yielded no verses; using cached default records", code);
            let fallback = self.verses().get(registry.default_code()).cloned();
            return Ok(fallback.unwrap_or_default());
        }

        // Substituted documents are not cached under the requested code so a
        // re-enabled language is loaded for real next time
        if !registry.resolve(&code).is_substituted() {
            self.verses().insert(code, document.clone());
        }
        Ok(document)
    }

    pub async fn get_random_verse(
        &self,
        language: Option<&str>,
    ) -> Result<Option<VerseRecord>, VerseError> {
        let code = self.code(language);
        let verses = self.get_all_verses(Some(&code)).await?;
        Ok(self
            .selector
            .pick_random_avoiding_repeat(&verses, &selection_key(&code, ALL_CATEGORIES)))
    }

    /// Random verse from `category`, or any random verse when the category
    /// has no verses in this language
    pub async fn select_by_category(
        &self,
        category: &str,
        language: Option<&str>,
    ) -> Result<Option<Selection>, VerseError> {
        let code = self.code(language);
        if category == ALL_CATEGORIES {
            let verse = self.get_random_verse(Some(&code)).await?;
            return Ok(verse.map(|verse| Selection {
                verse,
                fell_back: false,
            }));
        }

        let matching = self.category_records(&code, category).await?;
        if matching.is_empty() {
            info!(
                "No '{}' verses in '{}'; serving a random verse",
                category, code
            );
            let verse = self.get_random_verse(Some(&code)).await?;
            return Ok(verse.map(|verse| Selection {
                verse,
                fell_back: true,
            }));
        }

        Ok(self
            .selector
            .pick_random_avoiding_repeat(&matching, &selection_key(&code, category))
            .map(|verse| Selection {
                verse,
                fell_back: false,
            }))
    }

    pub async fn get_verse_by_category(
        &self,
        category: &str,
        language: Option<&str>,
    ) -> Result<Option<VerseRecord>, VerseError> {
        Ok(self
            .select_by_category(category, language)
            .await?
            .map(|selection| selection.verse))
    }

    async fn category_records(
        &self,
        code: &str,
        category: &str,
    ) -> Result<Arc<Vec<VerseRecord>>, VerseError> {
        let key = selection_key(code, category);
        let cached = self.by_category().get(&key).cloned();
        if let Some(records) = cached {
            return Ok(records);
        }
        let verses = self.get_all_verses(Some(code)).await?;
        let matching: Arc<Vec<VerseRecord>> = Arc::new(
            verses
                .iter()
                .filter(|v| v.in_category(category))
                .cloned()
                .collect(),
        );
        self.by_category().insert(key, matching.clone());
        Ok(matching)
    }

    /// First verse whose reference contains `reference`, ignoring case.
    /// "John 3:1" also matches "John 3:16"; the first in document order wins.
    pub async fn get_verse_by_reference(
        &self,
        reference: &str,
        language: Option<&str>,
    ) -> Result<Option<VerseRecord>, VerseError> {
        let wanted = reference.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(None);
        }
        let verses = self.get_all_verses(language).await?;
        Ok(verses
            .iter()
            .find(|v| v.reference.to_lowercase().contains(&wanted))
            .cloned())
    }

    /// Verses whose text or reference contains `query`, ranked, at most
    /// `MAX_SEARCH_RESULTS`. Queries under two characters return nothing.
    pub async fn search_verses(
        &self,
        query: &str,
        language: Option<&str>,
    ) -> Result<Vec<VerseRecord>, VerseError> {
        let query = query.trim().to_lowercase();
        if query.chars().count() < MIN_QUERY_CHARS {
            return Ok(Vec::new());
        }
        let verses = self.get_all_verses(language).await?;
        let matching: Vec<VerseRecord> = verses
            .iter()
            .filter(|v| {
                v.text.to_lowercase().contains(&query)
                    || v.reference.to_lowercase().contains(&query)
            })
            .cloned()
            .collect();

        let mut ranked = rank_search_results(&matching, &query);
        ranked.truncate(MAX_SEARCH_RESULTS);
        debug!("Search '{}' matched {} verses", query, ranked.len());
        Ok(ranked)
    }

    /// Categories present in the loaded verses, sorted, deduplicated
    /// ignoring case
    pub async fn categories_in_use(&self, language: Option<&str>) -> Result<Vec<String>, VerseError> {
        let verses = self.get_all_verses(language).await?;
        let mut seen: BTreeMap<String, String> = BTreeMap::new();
        for category in verses.iter().flat_map(|v| v.categories.iter()) {
            seen.entry(category.to_lowercase())
                .or_insert_with(|| category.clone());
        }
        Ok(seen.into_values().collect())
    }

    /// Drop cached records for one language
    pub fn forget_language(&self, code: &str) {
        self.verses().remove(code);
        let prefix = format!("{}:", code);
        self.by_category().retain(|key, _| !key.starts_with(&prefix));
    }

    /// Drop all cached records and repeat-avoidance state
    pub fn clear(&self) {
        self.verses().clear();
        self.by_category().clear();
        self.selector.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RemoteLanguage;
    use crate::test_support::{sample_xml, test_loader, verses_xml, MockFetcher, EN_URL, FR_URL};

    fn repository(fetcher: &Arc<MockFetcher>) -> VerseRepository {
        VerseRepository::new(test_loader(fetcher.clone()), VerseSelector::seeded(11))
    }

    fn english() -> String {
        verses_xml(&[
            ("For God so loved the world", "John 3:16", Some("Love")),
            ("Whoever believes in him", "John 3:17", Some("Faith")),
            ("The Lord is my shepherd", "Psalm 23:1", Some("Comfort")),
            ("Love is patient, love is kind", "1 Corinthians 13:4", Some("love")),
            ("Be strong and courageous", "Joshua 1:9", None),
        ])
    }

    #[tokio::test]
    async fn test_category_miss_falls_back_to_random() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(
            EN_URL,
            200,
            &verses_xml(&[("For I know the plans I have for you", "Jeremiah 29:11", None)]),
        );
        let repo = repository(&fetcher);

        let selection = repo
            .select_by_category("Faith", Some("en"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(selection.verse.reference, "Jeremiah 29:11");
        assert!(selection.fell_back);

        let verse = repo.get_verse_by_category("Faith", Some("en")).await.unwrap();
        assert_eq!(verse.unwrap().reference, "Jeremiah 29:11");
    }

    #[tokio::test]
    async fn test_category_filter_ignores_case() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(EN_URL, 200, &english());
        let repo = repository(&fetcher);

        for _ in 0..10 {
            let selection = repo.select_by_category("LOVE", None).await.unwrap().unwrap();
            assert!(!selection.fell_back);
            assert!(selection.verse.in_category("love"));
        }
    }

    #[tokio::test]
    async fn test_category_selection_alternates() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(EN_URL, 200, &english());
        let repo = repository(&fetcher);

        let mut previous = repo.get_verse_by_category("Love", None).await.unwrap();
        for _ in 0..20 {
            let next = repo.get_verse_by_category("Love", None).await.unwrap();
            assert_ne!(next, previous);
            previous = next;
        }
    }

    #[tokio::test]
    async fn test_all_is_unfiltered() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(EN_URL, 200, &english());
        let repo = repository(&fetcher);

        let selection = repo.select_by_category("All", None).await.unwrap().unwrap();
        assert!(!selection.fell_back);
        assert_eq!(repo.get_all_verses(None).await.unwrap().len(), 5);

        // Only the exact sentinel is unfiltered; "all" is an ordinary category
        let selection = repo.select_by_category("all", None).await.unwrap().unwrap();
        assert!(selection.fell_back);
    }

    #[tokio::test]
    async fn test_cached_language_rechecked_after_deactivation() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(EN_URL, 200, &english());
        fetcher.respond(FR_URL, 200, &sample_xml(&["Jean 3:16"]));
        let repo = repository(&fetcher);

        let fr = repo.get_all_verses(Some("fr")).await.unwrap();
        assert_eq!(fr[0].reference, "Jean 3:16");

        repo.loader.registry().apply_configuration(vec![RemoteLanguage {
            code: "fr".into(),
            url: FR_URL.into(),
            is_active: false,
        }]);
        let served = repo.get_all_verses(Some("fr")).await.unwrap();
        assert_eq!(served[0].reference, "John 3:16");
        assert!(!repo.verses().contains_key("fr"));
    }

    #[tokio::test]
    async fn test_reference_lookup_is_substring() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(EN_URL, 200, &english());
        let repo = repository(&fetcher);

        let exact = repo.get_verse_by_reference("psalm 23:1", None).await.unwrap();
        assert_eq!(exact.unwrap().reference, "Psalm 23:1");

        // Ambiguous: "John 3:1" is contained in both John 3:16 and 3:17
        let loose = repo.get_verse_by_reference("John 3:1", None).await.unwrap();
        assert_eq!(loose.unwrap().reference, "John 3:16");

        assert!(repo.get_verse_by_reference("Revelation 22:21", None).await.unwrap().is_none());
        assert!(repo.get_verse_by_reference("  ", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(EN_URL, 200, &english());
        let repo = repository(&fetcher);

        assert!(repo.search_verses("l", None).await.unwrap().is_empty());
        assert!(repo.search_verses(" ", None).await.unwrap().is_empty());

        let results = repo.search_verses("love", None).await.unwrap();
        let refs: Vec<&str> = results.iter().map(|r| r.reference.as_str()).collect();
        // 1 Cor 13:4: text + whole word + category = 65; John 3:16 ("loved"): 30 + 20 = 50
        assert_eq!(refs, vec!["1 Corinthians 13:4", "John 3:16"]);

        let results = repo.search_verses("john", None).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_search_is_capped() {
        let fetcher = Arc::new(MockFetcher::new());
        let refs: Vec<String> = (1..=30).map(|i| format!("Proverbs 3:{}", i)).collect();
        let refs: Vec<&str> = refs.iter().map(String::as_str).collect();
        fetcher.respond(EN_URL, 200, &sample_xml(&refs));
        let repo = repository(&fetcher);

        let results = repo.search_verses("proverbs", None).await.unwrap();
        assert_eq!(results.len(), MAX_SEARCH_RESULTS);
        assert_eq!(results[0].reference, "Proverbs 3:1");
    }

    #[tokio::test]
    async fn test_broken_language_serves_default() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(EN_URL, 200, &english());
        fetcher.respond(FR_URL, 200, "<!DOCTYPE html><html></html>");
        let repo = repository(&fetcher);

        let default = repo.get_all_verses(Some("en")).await.unwrap();
        let fr = repo.get_all_verses(Some("fr")).await.unwrap();
        assert_eq!(fr, default);
        assert!(repo.loader.registry().is_disabled("fr"));
        assert!(!repo.verses().contains_key("fr"));
    }

    #[tokio::test]
    async fn test_unknown_language_behaves_like_default() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(EN_URL, 200, &english());
        let repo = repository(&fetcher);

        let verse = repo.get_verse_by_reference("Joshua 1:9", Some("xx")).await.unwrap();
        assert_eq!(verse.unwrap().reference, "Joshua 1:9");
        assert!(repo.loader.registry().is_disabled("xx"));
    }

    #[tokio::test]
    async fn test_default_failure_propagates() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(EN_URL, 200, "   ");
        let repo = repository(&fetcher);

        assert_eq!(
            repo.get_random_verse(None).await,
            Err(VerseError::EmptySource)
        );
    }

    #[tokio::test]
    async fn test_set_language_notifies_on_change() {
        let fetcher = Arc::new(MockFetcher::new());
        let repo = repository(&fetcher);
        let mut events = repo.loader.registry().subscribe();

        repo.set_language("en");
        assert!(events.try_recv().is_err());

        repo.set_language("fr");
        assert_eq!(repo.language(), "fr");
        assert_eq!(
            events.try_recv().unwrap(),
            LanguageEvent::Changed {
                from: "en".into(),
                to: "fr".into()
            }
        );
        // Pure state update
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_categories() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(EN_URL, 200, &english());
        let repo = repository(&fetcher);

        assert_eq!(repo.get_categories()[0], "All");
        let in_use = repo.categories_in_use(None).await.unwrap();
        assert_eq!(in_use, vec!["Comfort", "Faith", "Love"]);
    }

    #[tokio::test]
    async fn test_forget_and_clear() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond(EN_URL, 200, &english());
        let repo = repository(&fetcher);

        repo.get_verse_by_category("Faith", None).await.unwrap();
        assert!(repo.verses().contains_key("en"));
        assert!(repo.by_category().contains_key("en:faith"));

        repo.forget_language("en");
        assert!(repo.verses().is_empty());
        assert!(repo.by_category().is_empty());

        repo.get_random_verse(None).await.unwrap();
        repo.clear();
        assert!(repo.verses().is_empty());
    }
}
