//! Time-boxed cache for a remotely hosted JSON lookup table.
//!
//! Lookup order on [`CachedResource::get`]:
//! 1. the in-memory copy, if younger than the TTL
//! 2. the persisted copy, if younger than the TTL
//! 3. a fresh fetch, which replaces both copies
//!
//! If the fetch fails the last known value is served (in-memory first, then
//! a stale persisted copy), otherwise an empty table. Nothing here returns an
//! error to resolution callers. No lock is held across the fetch, so two
//! concurrent refreshes both fetch and the later one wins.

use crate::config::RemoteDocumentConfig;
use crate::error::CardlinkError;
use crate::source::DocumentSource;
use crate::store::{Clock, KeyValueStore};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// A lookup table that can be rebuilt from its JSON document.
pub trait RemoteDocument: Default + Send + Sync {
    fn from_document(document: &serde_json::Value) -> Result<Self, CardlinkError>;

    fn entry_count(&self) -> usize;
}

#[derive(Debug)]
struct CachedValue<T> {
    value: Arc<T>,
    fetched_at_ms: i64,
}

impl<T> Clone for CachedValue<T> {
    fn clone(&self) -> Self {
        CachedValue {
            value: Arc::clone(&self.value),
            fetched_at_ms: self.fetched_at_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    pub fetched_at_ms: i64,
    pub entries: usize,
    pub fresh: bool,
}

pub struct CachedResource<T> {
    label: &'static str,
    url: RwLock<String>,
    value_key: String,
    timestamp_key: String,
    ttl_ms: i64,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    memory: RwLock<Option<CachedValue<T>>>,
}

impl<T: RemoteDocument> CachedResource<T> {
    pub fn new(
        label: &'static str,
        config: &RemoteDocumentConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        CachedResource {
            label,
            url: RwLock::new(config.url.clone()),
            value_key: config.value_key.clone(),
            timestamp_key: config.timestamp_key.clone(),
            ttl_ms: config.ttl_ms(),
            store,
            clock,
            memory: RwLock::new(None),
        }
    }

    pub fn url(&self) -> String {
        self.url.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Point future refreshes at another document. Empty input is ignored.
    pub fn set_url(&self, url: &str) {
        if url.is_empty() {
            return;
        }
        *self.url.write().unwrap_or_else(PoisonError::into_inner) = url.to_string();
        info!(resource = self.label, url = %url, "Remote document URL overridden");
    }

    pub async fn get<S: DocumentSource>(&self, source: &S) -> Arc<T> {
        let now = self.clock.now_ms();

        if let Some(cached) = self.memory_snapshot() {
            if self.is_fresh(cached.fetched_at_ms, now) {
                return cached.value;
            }
            debug!(resource = self.label, "In-memory copy expired");
        }

        let persisted = self.load_persisted();
        if let Some(cached) = &persisted {
            if self.is_fresh(cached.fetched_at_ms, now) {
                info!(
                    resource = self.label,
                    age_ms = now - cached.fetched_at_ms,
                    entries = cached.value.entry_count(),
                    "Using persisted copy"
                );
                self.replace_memory(cached.clone());
                return Arc::clone(&cached.value);
            }
            warn!(resource = self.label, ttl_ms = self.ttl_ms, "Persisted copy expired");
        }

        let url = self.url();
        info!(resource = self.label, url = %url, "Fetching remote document");
        let fetched = match source.fetch_document(&url).await {
            Ok(document) => T::from_document(&document).map(|value| (document, value)),
            Err(e) => Err(e),
        };

        match fetched {
            Ok((document, value)) => {
                let fetched_at_ms = self.clock.now_ms();
                let cached = CachedValue {
                    value: Arc::new(value),
                    fetched_at_ms,
                };
                info!(
                    resource = self.label,
                    entries = cached.value.entry_count(),
                    "Remote document loaded"
                );
                self.replace_memory(cached.clone());
                if let Err(e) = self.persist(&document, fetched_at_ms) {
                    warn!(resource = self.label, error = %e, "Could not persist remote document");
                }
                cached.value
            }
            Err(e) => {
                warn!(resource = self.label, url = %url, error = %e, "Remote document load failed");
                self.last_known(persisted)
            }
        }
    }

    /// Admin override: replace the table wholesale and restart its TTL.
    pub fn set(&self, document: serde_json::Value) -> Result<Arc<T>, CardlinkError> {
        let value = Arc::new(T::from_document(&document)?);
        let fetched_at_ms = self.clock.now_ms();
        self.replace_memory(CachedValue {
            value: Arc::clone(&value),
            fetched_at_ms,
        });
        info!(
            resource = self.label,
            entries = value.entry_count(),
            "Remote document replaced by override"
        );
        self.persist(&document, fetched_at_ms)?;
        Ok(value)
    }

    /// Forget both the in-memory and the persisted copy.
    pub fn invalidate(&self) -> Result<(), CardlinkError> {
        *self.memory.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.store.remove(&self.value_key)?;
        self.store.remove(&self.timestamp_key)?;
        info!(resource = self.label, "Cache invalidated");
        Ok(())
    }

    pub fn cache_info(&self) -> Option<CacheInfo> {
        let cached = self.memory_snapshot().or_else(|| self.load_persisted())?;
        Some(CacheInfo {
            fetched_at_ms: cached.fetched_at_ms,
            entries: cached.value.entry_count(),
            fresh: self.is_fresh(cached.fetched_at_ms, self.clock.now_ms()),
        })
    }

    fn is_fresh(&self, fetched_at_ms: i64, now_ms: i64) -> bool {
        fetched_at_ms > 0 && now_ms - fetched_at_ms < self.ttl_ms
    }

    fn memory_snapshot(&self) -> Option<CachedValue<T>> {
        self.memory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_memory(&self, cached: CachedValue<T>) {
        *self.memory.write().unwrap_or_else(PoisonError::into_inner) = Some(cached);
    }

    fn last_known(&self, persisted: Option<CachedValue<T>>) -> Arc<T> {
        if let Some(cached) = self.memory_snapshot() {
            debug!(resource = self.label, "Keeping in-memory copy after failed refresh");
            return cached.value;
        }
        if let Some(cached) = persisted {
            debug!(resource = self.label, "Keeping stale persisted copy after failed refresh");
            self.replace_memory(cached.clone());
            return cached.value;
        }
        Arc::new(T::default())
    }

    fn load_persisted(&self) -> Option<CachedValue<T>> {
        let timestamp = match self.store.get(&self.timestamp_key) {
            Ok(Some(raw)) => raw.trim().parse::<i64>().ok()?,
            Ok(None) => return None,
            Err(e) => {
                warn!(resource = self.label, error = %e, "Store read failed");
                return None;
            }
        };
        let raw = match self.store.get(&self.value_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(resource = self.label, error = %e, "Store read failed");
                return None;
            }
        };

        let value = serde_json::from_str::<serde_json::Value>(&raw)
            .map_err(CardlinkError::from)
            .and_then(|document| T::from_document(&document));
        match value {
            Ok(value) => Some(CachedValue {
                value: Arc::new(value),
                fetched_at_ms: timestamp,
            }),
            Err(e) => {
                warn!(resource = self.label, error = %e, "Persisted copy unreadable");
                None
            }
        }
    }

    fn persist(
        &self,
        document: &serde_json::Value,
        fetched_at_ms: i64,
    ) -> Result<(), CardlinkError> {
        self.store
            .set(&self.value_key, &serde_json::to_string(document)?)?;
        self.store
            .set(&self.timestamp_key, &fetched_at_ms.to_string())?;
        debug!(
            resource = self.label,
            strategy = self.store.strategy_name(),
            "Persisted remote document"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use crate::store::{ManualClock, MemoryStore};
    use serde_json::json;

    const URL: &str = "https://data.example/names.json";
    const HOUR_MS: i64 = 3600 * 1000;

    #[derive(Debug, Default, PartialEq)]
    struct Names(Vec<String>);

    impl RemoteDocument for Names {
        fn from_document(document: &serde_json::Value) -> Result<Self, CardlinkError> {
            let names = document
                .as_array()
                .ok_or_else(|| CardlinkError::Cache("expected an array".to_string()))?
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();
            Ok(Names(names))
        }

        fn entry_count(&self) -> usize {
            self.0.len()
        }
    }

    fn config() -> RemoteDocumentConfig {
        RemoteDocumentConfig {
            url: URL.to_string(),
            value_key: "names".to_string(),
            timestamp_key: "names_ts".to_string(),
            ttl_hours: 24,
        }
    }

    fn create_test_resource(
        store: &MemoryStore,
        clock: &Arc<ManualClock>,
    ) -> CachedResource<Names> {
        CachedResource::new("names", &config(), Arc::new(store.clone()), clock.clone())
    }

    #[tokio::test]
    async fn test_second_get_uses_memory() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(100 * HOUR_MS));
        let source = StaticSource::new();
        source.serve(URL, json!(["a", "b"]));
        let resource = create_test_resource(&store, &clock);

        let first = resource.get(&source).await;
        let second = resource.get(&source).await;

        assert_eq!(*first, Names(vec!["a".into(), "b".into()]));
        assert_eq!(first, second);
        assert_eq!(source.fetch_count(URL), 1);
        assert_eq!(store.snapshot().get("names_ts").map(String::as_str), Some("360000000"));
    }

    #[tokio::test]
    async fn test_fresh_persisted_copy_skips_fetch() {
        let store = MemoryStore::new();
        let now = 100 * HOUR_MS;
        let ts = (now - HOUR_MS).to_string();
        store.preload(&[("names", r#"["x"]"#), ("names_ts", ts.as_str())]);
        let clock = Arc::new(ManualClock::new(now));
        let source = StaticSource::new();
        let resource = create_test_resource(&store, &clock);

        assert_eq!(*resource.get(&source).await, Names(vec!["x".into()]));
        assert_eq!(source.total_fetches(), 0);
    }

    #[tokio::test]
    async fn test_expired_persisted_copy_refetches_once() {
        let store = MemoryStore::new();
        let now = 100 * HOUR_MS;
        let stale_ts = (now - 25 * HOUR_MS).to_string();
        store.preload(&[("names", r#"["old"]"#), ("names_ts", stale_ts.as_str())]);
        let clock = Arc::new(ManualClock::new(now));
        let source = StaticSource::new();
        source.serve(URL, json!(["new"]));
        let resource = create_test_resource(&store, &clock);

        assert_eq!(*resource.get(&source).await, Names(vec!["new".into()]));
        assert_eq!(*resource.get(&source).await, Names(vec!["new".into()]));
        assert_eq!(source.fetch_count(URL), 1);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get("names_ts"), Some(&now.to_string()));
        assert_eq!(snapshot.get("names").map(String::as_str), Some(r#"["new"]"#));
    }

    #[tokio::test]
    async fn test_memory_expiry_triggers_refresh() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(100 * HOUR_MS));
        let source = StaticSource::new();
        source.serve(URL, json!(["a"]));
        let resource = create_test_resource(&store, &clock);

        resource.get(&source).await;
        clock.advance(24 * HOUR_MS);
        source.serve(URL, json!(["a", "b"]));
        assert_eq!(resource.get(&source).await.entry_count(), 2);
        assert_eq!(source.fetch_count(URL), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_without_history_is_empty() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(100 * HOUR_MS));
        let source = StaticSource::new();
        source.fail(URL, 503);
        let resource = create_test_resource(&store, &clock);

        assert_eq!(*resource.get(&source).await, Names::default());
        assert!(store.snapshot().is_empty());
        assert_eq!(resource.cache_info(), None);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_stale_persisted_copy() {
        let store = MemoryStore::new();
        let now = 100 * HOUR_MS;
        let stale_ts = (now - 48 * HOUR_MS).to_string();
        store.preload(&[("names", r#"["kept"]"#), ("names_ts", stale_ts.as_str())]);
        let clock = Arc::new(ManualClock::new(now));
        let source = StaticSource::new();
        source.fail(URL, 500);
        let resource = create_test_resource(&store, &clock);

        assert_eq!(*resource.get(&source).await, Names(vec!["kept".into()]));
        // the stale timestamp is not refreshed, so the next call tries again
        assert_eq!(store.snapshot().get("names_ts"), Some(&stale_ts));
        resource.get(&source).await;
        assert_eq!(source.fetch_count(URL), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_memory_copy() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(100 * HOUR_MS));
        let source = StaticSource::new();
        source.serve(URL, json!(["a"]));
        let resource = create_test_resource(&store, &clock);
        resource.get(&source).await;

        clock.advance(30 * HOUR_MS);
        source.fail(URL, 500);
        assert_eq!(*resource.get(&source).await, Names(vec!["a".into()]));
    }

    #[tokio::test]
    async fn test_override_and_invalidate() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(100 * HOUR_MS));
        let source = StaticSource::new();
        let resource = create_test_resource(&store, &clock);

        resource.set(json!(["manual"])).unwrap();
        assert_eq!(*resource.get(&source).await, Names(vec!["manual".into()]));
        assert_eq!(source.total_fetches(), 0);
        let info = resource.cache_info().unwrap();
        assert_eq!(info.entries, 1);
        assert_eq!(info.fetched_at_ms, 100 * HOUR_MS);
        assert!(info.fresh);

        resource.invalidate().unwrap();
        assert!(store.snapshot().is_empty());
        assert_eq!(resource.cache_info(), None);
    }

    #[tokio::test]
    async fn test_override_rejects_bad_document() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(100 * HOUR_MS));
        let resource = create_test_resource(&store, &clock);
        assert!(resource.set(json!({"not": "an array"})).is_err());
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_store_write_failure_still_serves_value() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let clock = Arc::new(ManualClock::new(100 * HOUR_MS));
        let source = StaticSource::new();
        source.serve(URL, json!(["a"]));
        let resource = create_test_resource(&store, &clock);

        assert_eq!(resource.get(&source).await.entry_count(), 1);
        assert_eq!(resource.get(&source).await.entry_count(), 1);
        assert_eq!(source.fetch_count(URL), 1);
    }

    #[tokio::test]
    async fn test_set_url() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(100 * HOUR_MS));
        let source = StaticSource::new();
        let other = "https://mirror.example/names.json";
        source.serve(other, json!(["m"]));
        let resource = create_test_resource(&store, &clock);

        resource.set_url("");
        assert_eq!(resource.url(), URL);
        resource.set_url(other);
        assert_eq!(*resource.get(&source).await, Names(vec!["m".into()]));
        assert_eq!(source.fetch_count(other), 1);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_do_not_block_each_other() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(100 * HOUR_MS));
        let source = StaticSource::new().with_delay(std::time::Duration::from_millis(20));
        source.serve(URL, json!(["a"]));
        let resource = create_test_resource(&store, &clock);

        let (a, b) = tokio::join!(resource.get(&source), resource.get(&source));
        assert_eq!(a, b);
        // both callers fetched; the last writer wins
        assert_eq!(source.fetch_count(URL), 2);
    }
}
