//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields a working setup pointed at the public data repository.

use crate::error::CardlinkError;
use crate::normalize::NormalizerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const SET_ABBREVIATIONS_URL: &str =
    "https://raw.githubusercontent.com/gagihal/poroscripts-data/main/utils/mcmsetmap.json";
pub const CROSS_REFERENCE_URL: &str =
    "https://raw.githubusercontent.com/gagihal/poroscripts-data/main/utils/product-id-map-v2.json";

/// Set abbreviations are refreshed daily.
pub const SET_ABBREVIATIONS_TTL_HOURS: i64 = 24;
/// Product ids change less often than set lists.
pub const CROSS_REFERENCE_TTL_HOURS: i64 = 7 * 24;
/// Upper bound for any `ttl_hours`: ten years.
pub const MAX_TTL_HOURS: i64 = 10 * 365 * 24;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub set_abbreviations: RemoteDocumentConfig,
    pub cross_reference: RemoteDocumentConfig,
    pub normalizer: NormalizerConfig,
    pub urls: UrlTemplates,
    pub broker: BrokerConfig,
    /// Overrides the platform cache directory for the persisted store.
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            set_abbreviations: RemoteDocumentConfig::set_abbreviations(),
            cross_reference: RemoteDocumentConfig::cross_reference(),
            normalizer: NormalizerConfig::default(),
            urls: UrlTemplates::default(),
            broker: BrokerConfig::default(),
            cache_dir: None,
        }
    }
}

/// Where a remote lookup table lives and how it is cached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteDocumentConfig {
    pub url: String,
    /// Store key holding the serialized document.
    pub value_key: String,
    /// Store key holding the fetch time in epoch milliseconds.
    pub timestamp_key: String,
    pub ttl_hours: i64,
}

impl RemoteDocumentConfig {
    pub fn set_abbreviations() -> Self {
        RemoteDocumentConfig {
            url: SET_ABBREVIATIONS_URL.to_string(),
            value_key: "cardlink_setabbr_map_v1".to_string(),
            timestamp_key: "cardlink_setabbr_map_ts_v1".to_string(),
            ttl_hours: SET_ABBREVIATIONS_TTL_HOURS,
        }
    }

    pub fn cross_reference() -> Self {
        RemoteDocumentConfig {
            url: CROSS_REFERENCE_URL.to_string(),
            value_key: "cardlink_product_id_map_v4".to_string(),
            timestamp_key: "cardlink_product_id_map_ts_v4".to_string(),
            ttl_hours: CROSS_REFERENCE_TTL_HOURS,
        }
    }

    /// Saturates at `i64::MAX`.
    pub fn ttl_ms(&self) -> i64 {
        self.ttl_hours.saturating_mul(3600 * 1000)
    }
}

/// URL templates per marketplace. `{id}` is interpolated raw, `{query}`,
/// `{name}` and `{set}` are percent-encoded before interpolation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UrlTemplates {
    pub cardmarket_direct: String,
    pub cardmarket_search: String,
    pub tcgplayer_direct: String,
    pub tcgplayer_search: String,
    pub store_manager_search: String,
}

impl Default for UrlTemplates {
    fn default() -> Self {
        UrlTemplates {
            cardmarket_direct: "https://www.cardmarket.com/Pokemon/Products?idProduct={id}"
                .to_string(),
            cardmarket_search:
                "https://www.cardmarket.com/en/Pokemon/Products/Search?searchString={query}"
                    .to_string(),
            tcgplayer_direct: "https://www.tcgplayer.com/product/{id}".to_string(),
            tcgplayer_search: "https://www.tcgplayer.com/search/pokemon/product?Language=English&ProductTypeName=Cards&productLineName=pokemon&q={query}&view=grid".to_string(),
            store_manager_search:
                "https://poromagia.com/store_manager/pokemon/?name={name}&set={set}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    /// Host whose pages (and subdomains) may drive the broker over https.
    pub trusted_host: String,
    /// Channel name for the same-origin broadcast variant.
    pub bus_name: String,
    pub ping_interval_ms: u64,
    pub ping_max_attempts: u32,
    pub request_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            trusted_host: "poromagia.com".to_string(),
            bus_name: "cardlink-broker".to_string(),
            ping_interval_ms: 400,
            ping_max_attempts: 10,
            request_timeout_ms: 2000,
        }
    }
}

impl BrokerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Config {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, CardlinkError> {
        debug!(path = %path.display(), "Reading configuration file");
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self, CardlinkError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Config::default()),
        }
    }

    pub fn validate(&self) -> Result<(), CardlinkError> {
        for (label, doc) in [
            ("set_abbreviations", &self.set_abbreviations),
            ("cross_reference", &self.cross_reference),
        ] {
            if doc.ttl_hours <= 0 || doc.ttl_hours > MAX_TTL_HOURS {
                return Err(CardlinkError::Config(format!(
                    "{}.ttl_hours must be between 1 and {}, got {}",
                    label, MAX_TTL_HOURS, doc.ttl_hours
                )));
            }
            if doc.value_key.is_empty() || doc.value_key == doc.timestamp_key {
                return Err(CardlinkError::Config(format!(
                    "{} needs two distinct, non-empty store keys",
                    label
                )));
            }
            url::Url::parse(&doc.url)
                .map_err(|e| CardlinkError::Config(format!("{}.url: {}", label, e)))?;
        }

        let keys = [
            &self.set_abbreviations.value_key,
            &self.set_abbreviations.timestamp_key,
        ];
        if keys.contains(&&self.cross_reference.value_key)
            || keys.contains(&&self.cross_reference.timestamp_key)
        {
            return Err(CardlinkError::Config(
                "set_abbreviations and cross_reference must not share store keys".to_string(),
            ));
        }

        let templates = [
            ("cardmarket_direct", &self.urls.cardmarket_direct, "{id}"),
            ("tcgplayer_direct", &self.urls.tcgplayer_direct, "{id}"),
            ("cardmarket_search", &self.urls.cardmarket_search, "{query}"),
            ("tcgplayer_search", &self.urls.tcgplayer_search, "{query}"),
            ("store_manager_search", &self.urls.store_manager_search, "{name}"),
        ];
        for (label, template, placeholder) in templates {
            if !template.contains(placeholder) {
                return Err(CardlinkError::Config(format!(
                    "urls.{} is missing the {} placeholder",
                    label, placeholder
                )));
            }
        }

        if self.broker.bus_name.trim().is_empty() {
            return Err(CardlinkError::Config("broker.bus_name must not be empty".to_string()));
        }

        if self.broker.trusted_host.is_empty() || self.broker.trusted_host.contains('/') {
            return Err(CardlinkError::Config(format!(
                "broker.trusted_host must be a bare host name, got '{}'",
                self.broker.trusted_host
            )));
        }

        Ok(())
    }
}
