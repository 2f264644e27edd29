//! Catalog id to marketplace product id resolution, both directions.
//!
//! The remote document maps catalog ids to `{"mcmId": .., "tcgId": ..}`.
//! Reverse lookups are served from indexes built once per load.

use crate::cached_resource::{CacheInfo, CachedResource, RemoteDocument};
use crate::config::RemoteDocumentConfig;
use crate::error::CardlinkError;
use crate::models::CatalogId;
use crate::source::DocumentSource;
use crate::store::{Clock, KeyValueStore};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossRefRecord {
    #[serde(
        rename = "mcmId",
        alias = "marketplaceAId",
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub cardmarket_id: Option<String>,
    #[serde(
        rename = "tcgId",
        alias = "marketplaceBId",
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub tcgplayer_id: Option<String>,
}

/// Accepts ids as strings or numbers; `0`, `""` and `null` mean absent.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => valid_id(&s),
        Some(serde_json::Value::Number(n)) => valid_id(&n.to_string()),
        _ => None,
    })
}

fn valid_id(raw: &str) -> Option<String> {
    CatalogId::parse(raw).map(|id| id.as_str().to_string())
}

/// Numeric ids ascending, then anything else lexically.
fn catalog_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[derive(Debug, Clone, Default)]
pub struct CrossRefMap {
    records: HashMap<String, CrossRefRecord>,
    by_cardmarket: HashMap<String, String>,
    by_tcgplayer: HashMap<String, String>,
}

impl CrossRefMap {
    pub fn from_records(records: HashMap<String, CrossRefRecord>) -> Self {
        let mut catalog_ids: Vec<&String> = records.keys().collect();
        catalog_ids.sort_by(|a, b| catalog_order(a, b));

        let mut by_cardmarket = HashMap::new();
        let mut by_tcgplayer = HashMap::new();
        for catalog_id in catalog_ids {
            let record = &records[catalog_id];
            if let Some(id) = &record.cardmarket_id {
                by_cardmarket
                    .entry(id.clone())
                    .or_insert_with(|| catalog_id.clone());
            }
            if let Some(id) = &record.tcgplayer_id {
                by_tcgplayer
                    .entry(id.clone())
                    .or_insert_with(|| catalog_id.clone());
            }
        }

        CrossRefMap {
            records,
            by_cardmarket,
            by_tcgplayer,
        }
    }

    pub fn record(&self, id: &CatalogId) -> Option<&CrossRefRecord> {
        self.records.get(id.as_str())
    }

    pub fn catalog_id_for_cardmarket(&self, cardmarket_id: &str) -> Option<CatalogId> {
        self.by_cardmarket
            .get(cardmarket_id)
            .and_then(|id| CatalogId::parse(id))
    }

    pub fn catalog_id_for_tcgplayer(&self, tcgplayer_id: &str) -> Option<CatalogId> {
        self.by_tcgplayer
            .get(tcgplayer_id)
            .and_then(|id| CatalogId::parse(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RemoteDocument for CrossRefMap {
    fn from_document(document: &serde_json::Value) -> Result<Self, CardlinkError> {
        let object = document.as_object().ok_or_else(|| {
            CardlinkError::Cache("Cross-reference document is not a JSON object".to_string())
        })?;

        let mut records = HashMap::with_capacity(object.len());
        for (catalog_id, entry) in object {
            let Some(catalog_id) = CatalogId::parse(catalog_id) else {
                continue;
            };
            match CrossRefRecord::deserialize(entry) {
                Ok(record) => {
                    records.insert(catalog_id.as_str().to_string(), record);
                }
                Err(e) => debug!(catalog_id = %catalog_id, error = %e, "Skipping malformed entry"),
            }
        }
        Ok(CrossRefMap::from_records(records))
    }

    fn entry_count(&self) -> usize {
        self.records.len()
    }
}

pub struct CrossRefResolver<S> {
    source: Arc<S>,
    cache: CachedResource<CrossRefMap>,
}

impl<S: DocumentSource> CrossRefResolver<S> {
    pub fn new(
        config: &RemoteDocumentConfig,
        source: Arc<S>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        CrossRefResolver {
            source,
            cache: CachedResource::new("cross_reference", config, store, clock),
        }
    }

    async fn map(&self) -> Arc<CrossRefMap> {
        self.cache.get(self.source.as_ref()).await
    }

    async fn record(&self, catalog_id: &str) -> Option<CrossRefRecord> {
        let id = CatalogId::parse(catalog_id)?;
        let map = self.map().await;
        let record = map.record(&id).cloned();
        trace!(
            catalog_id = %id,
            entries = map.len(),
            found = record.is_some(),
            "Cross-reference lookup"
        );
        record
    }

    pub async fn cardmarket_id(&self, catalog_id: &str) -> Option<String> {
        self.record(catalog_id).await?.cardmarket_id
    }

    pub async fn tcgplayer_id(&self, catalog_id: &str) -> Option<String> {
        self.record(catalog_id).await?.tcgplayer_id
    }

    pub async fn catalog_id_from_cardmarket(&self, cardmarket_id: &str) -> Option<CatalogId> {
        let id = valid_id(cardmarket_id)?;
        self.map().await.catalog_id_for_cardmarket(&id)
    }

    pub async fn catalog_id_from_tcgplayer(&self, tcgplayer_id: &str) -> Option<CatalogId> {
        let id = valid_id(tcgplayer_id)?;
        self.map().await.catalog_id_for_tcgplayer(&id)
    }

    pub async fn tcgplayer_id_from_cardmarket(&self, cardmarket_id: &str) -> Option<String> {
        let catalog_id = self.catalog_id_from_cardmarket(cardmarket_id).await?;
        self.tcgplayer_id(catalog_id.as_str()).await
    }

    pub async fn cardmarket_id_from_tcgplayer(&self, tcgplayer_id: &str) -> Option<String> {
        let catalog_id = self.catalog_id_from_tcgplayer(tcgplayer_id).await?;
        self.cardmarket_id(catalog_id.as_str()).await
    }

    pub async fn preload(&self) -> usize {
        self.map().await.len()
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
