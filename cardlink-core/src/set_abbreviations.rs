//! Set name to Cardmarket set code resolution.
//!
//! The table is a flat JSON object (`{"Base Set": "BS", ...}`) hosted
//! remotely and cached for a day.

use crate::cached_resource::{CacheInfo, CachedResource, RemoteDocument};
use crate::config::RemoteDocumentConfig;
use crate::error::CardlinkError;
use crate::source::DocumentSource;
use crate::store::{Clock, KeyValueStore};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

lazy_static! {
    static ref PARENTHETICAL_RE: Regex = Regex::new(r"\s*\([^)]*\)\s*").unwrap();
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    static ref ADDITIONALS_SEPARATED_RE: Regex =
        Regex::new(r"(?i)\s*[:\-\x{2013}\x{2014}]\s*additionals?$").unwrap();
    static ref ADDITIONALS_TRAILING_RE: Regex = Regex::new(r"(?i)\s+additionals?$").unwrap();
}

/// Lookup key for a set label: NBSP folded to space, parentheticals
/// dropped, whitespace collapsed, lowercased.
pub fn normalize_set_key(set_full: &str) -> String {
    let text = set_full.replace('\u{00a0}', " ");
    let text = PARENTHETICAL_RE.replace_all(&text, " ");
    let text = WHITESPACE_RE.replace_all(&text, " ");
    text.trim().to_lowercase()
}

/// Drop a trailing "Additionals" qualifier, if any.
fn strip_additionals(key: &str) -> Option<String> {
    let stripped = ADDITIONALS_SEPARATED_RE.replace(key, "");
    let stripped = ADDITIONALS_TRAILING_RE.replace(&stripped, "");
    let stripped = stripped.trim();
    if stripped.is_empty() || stripped == key {
        None
    } else {
        Some(stripped.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbbreviationMap {
    codes: HashMap<String, String>,
}

impl AbbreviationMap {
    /// Abbreviation for a raw set label, or an empty string.
    pub fn lookup(&self, set_full: &str) -> String {
        let key = normalize_set_key(set_full);
        if key.is_empty() {
            return String::new();
        }
        if let Some(code) = self.codes.get(&key) {
            return code.clone();
        }
        if let Some(base) = strip_additionals(&key) {
            if let Some(code) = self.codes.get(&base) {
                trace!(set = %set_full, base = %base, "Matched after dropping additionals");
                return code.clone();
            }
        }
        String::new()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl RemoteDocument for AbbreviationMap {
    fn from_document(document: &serde_json::Value) -> Result<Self, CardlinkError> {
        let object = document.as_object().ok_or_else(|| {
            CardlinkError::Cache("Set abbreviation document is not a JSON object".to_string())
        })?;

        let mut codes = HashMap::with_capacity(object.len());
        for (set_name, code) in object {
            match code.as_str() {
                Some(code) => {
                    let key = normalize_set_key(set_name);
                    if !key.is_empty() {
                        codes.insert(key, code.trim().to_string());
                    }
                }
                None => debug!(set = %set_name, "Skipping non-string abbreviation"),
            }
        }
        Ok(AbbreviationMap { codes })
    }

    fn entry_count(&self) -> usize {
        self.codes.len()
    }
}

pub struct AbbreviationResolver<S> {
    source: Arc<S>,
    cache: CachedResource<AbbreviationMap>,
}

impl<S: DocumentSource> AbbreviationResolver<S> {
    pub fn new(
        config: &RemoteDocumentConfig,
        source: Arc<S>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        AbbreviationResolver {
            source,
            cache: CachedResource::new("set_abbreviations", config, store, clock),
        }
    }

    /// Cardmarket set code for `set_full`; empty when unknown.
    pub async fn resolve(&self, set_full: &str) -> String {
        if normalize_set_key(set_full).is_empty() {
            return String::new();
        }
        self.cache.get(self.source.as_ref()).await.lookup(set_full)
    }

    /// Warm the cache ahead of the first resolution.
    pub async fn preload(&self) -> usize {
        self.cache.get(self.source.as_ref()).await.len()
    }

    pub fn set_map(&self, document: serde_json::Value) -> Result<usize, CardlinkError> {
        Ok(self.cache.set(document)?.len())
    }

    pub fn set_map_url(&self, url: &str) {
        self.cache.set_url(url);
    }

    pub fn invalidate(&self) -> Result<(), CardlinkError> {
        self.cache.invalidate()
    }

    pub fn cache_info(&self) -> Option<CacheInfo> {
        self.cache.cache_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SET_ABBREVIATIONS_URL;
    use crate::source::StaticSource;
    use crate::store::{ManualClock, MemoryStore};
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;
    const DAY_MS: i64 = 24 * 3600 * 1000;

    fn sample_document() -> serde_json::Value {
        json!({
            "Base Set": "BS",
            "Scarlet & Violet": "SVI",
            "Black Star Promos (SWSH)": "SWSHP",
            "Crown Zenith": "CRZ",
            "Obsidian  Flames": "OBF",
            "Bad Entry": 17
        })
    }

    fn create_test_resolver(
        source: &Arc<StaticSource>,
        store: &MemoryStore,
        clock: &Arc<ManualClock>,
    ) -> AbbreviationResolver<StaticSource> {
        AbbreviationResolver::new(
            &RemoteDocumentConfig::set_abbreviations(),
            Arc::clone(source),
            Arc::new(store.clone()),
            clock.clone(),
        )
    }

    #[test]
    fn test_normalize_set_key() {
        assert_eq!(normalize_set_key("Base Set"), "base set");
        assert_eq!(normalize_set_key("  Crown\u{00a0}Zenith  "), "crown zenith");
        assert_eq!(normalize_set_key("Black Star Promos (SWSH)"), "black star promos");
        assert_eq!(normalize_set_key("Hidden (Fates) Shiny Vault"), "hidden shiny vault");
        assert_eq!(normalize_set_key(""), "");
        assert_eq!(normalize_set_key("(only)"), "");
    }

    #[test]
    fn test_strip_additionals() {
        assert_eq!(strip_additionals("crown zenith: additionals").as_deref(), Some("crown zenith"));
        assert_eq!(strip_additionals("crown zenith - additional").as_deref(), Some("crown zenith"));
        assert_eq!(
            strip_additionals("crown zenith \u{2013} additionals").as_deref(),
            Some("crown zenith")
        );
        assert_eq!(strip_additionals("crown zenith additionals").as_deref(), Some("crown zenith"));
        assert_eq!(strip_additionals("crown zenith"), None);
        assert_eq!(strip_additionals("additionals"), None);
    }

    #[test]
    fn test_map_lookup() {
        let map = AbbreviationMap::from_document(&sample_document()).unwrap();
        assert_eq!(map.len(), 5);
        assert_eq!(map.lookup("Base Set"), "BS");
        assert_eq!(map.lookup("BASE  SET"), "BS");
        assert_eq!(map.lookup("Black Star Promos"), "SWSHP");
        assert_eq!(map.lookup("Obsidian Flames"), "OBF");
        assert_eq!(map.lookup("Crown Zenith: Additionals"), "CRZ");
        assert_eq!(map.lookup("Crown Zenith Additionals"), "CRZ");
        assert_eq!(map.lookup("Unknown Set"), "");
        assert_eq!(map.lookup("Bad Entry"), "");
    }

    #[test]
    fn test_non_object_document_rejected() {
        assert!(AbbreviationMap::from_document(&json!(["BS"])).is_err());
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent_without_refetch() {
        let source = Arc::new(StaticSource::new());
        source.serve(SET_ABBREVIATIONS_URL, sample_document());
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        let resolver = create_test_resolver(&source, &store, &clock);

        assert_eq!(resolver.resolve("Base Set").await, "BS");
        assert_eq!(resolver.resolve("Base Set").await, "BS");
        assert_eq!(resolver.resolve("Scarlet & Violet").await, "SVI");
        assert_eq!(source.fetch_count(SET_ABBREVIATIONS_URL), 1);

        let snapshot = store.snapshot();
        assert!(snapshot.contains_key("cardlink_setabbr_map_v1"));
        assert_eq!(
            snapshot.get("cardlink_setabbr_map_ts_v1"),
            Some(&NOW.to_string())
        );
    }

    #[tokio::test]
    async fn test_empty_set_skips_fetch() {
        let source = Arc::new(StaticSource::new());
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        let resolver = create_test_resolver(&source, &store, &clock);

        assert_eq!(resolver.resolve("").await, "");
        assert_eq!(resolver.resolve("  ").await, "");
        assert_eq!(source.total_fetches(), 0);
    }

    #[tokio::test]
    async fn test_expired_map_refetched_once() {
        let source = Arc::new(StaticSource::new());
        source.serve(SET_ABBREVIATIONS_URL, json!({"Base Set": "BS2"}));
        let store = MemoryStore::new();
        let old_ts = (NOW - DAY_MS - 1).to_string();
        store.preload(&[
            ("cardlink_setabbr_map_v1", r#"{"Base Set":"BS"}"#),
            ("cardlink_setabbr_map_ts_v1", old_ts.as_str()),
        ]);
        let clock = Arc::new(ManualClock::new(NOW));
        let resolver = create_test_resolver(&source, &store, &clock);

        assert_eq!(resolver.resolve("Base Set").await, "BS2");
        assert_eq!(resolver.resolve("Base Set").await, "BS2");
        assert_eq!(source.fetch_count(SET_ABBREVIATIONS_URL), 1);
        assert_eq!(
            store.snapshot().get("cardlink_setabbr_map_ts_v1"),
            Some(&NOW.to_string())
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_degrades_to_empty() {
        let source = Arc::new(StaticSource::new());
        source.fail(SET_ABBREVIATIONS_URL, 502);
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        let resolver = create_test_resolver(&source, &store, &clock);

        assert_eq!(resolver.resolve("Base Set").await, "");
        assert_eq!(resolver.preload().await, 0);
    }

    #[tokio::test]
    async fn test_override_and_url_change() {
        let source = Arc::new(StaticSource::new());
        let mirror = "https://mirror.example/sets.json";
        source.serve(mirror, json!({"Base Set": "MIRROR"}));
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(NOW));
        let resolver = create_test_resolver(&source, &store, &clock);

        assert_eq!(resolver.set_map(json!({"Base Set": "OVR"})).unwrap(), 1);
        assert_eq!(resolver.resolve("Base Set").await, "OVR");
        assert_eq!(source.total_fetches(), 0);

        resolver.set_map_url(mirror);
        resolver.invalidate().unwrap();
        assert_eq!(resolver.cache_info(), None);
        assert_eq!(resolver.resolve("base set").await, "MIRROR");
        assert_eq!(resolver.cache_info().map(|info| info.entries), Some(1));
    }
}
