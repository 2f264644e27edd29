pub mod broker;
pub mod buttons;
pub mod cached_resource;
pub mod config;
pub mod crossref;
pub mod error;
pub mod models;
pub mod normalize;
pub mod query;
pub mod set_abbreviations;
pub mod source;
pub mod store;
pub mod tabs;

pub use broker::{
    BroadcastBus, BrokerClient, BrokerError, BrokerHandle, BrokerMessage, BusBroker, BusEndpoint,
    CrossOriginBroker, OriginPolicy, PostedMessage, RetryPolicy, WindowPort, spawn_bus_broker,
    spawn_cross_origin_broker,
};
pub use buttons::{
    ButtonFactory, ButtonOptions, ClickGesture, ElementKind, LinkCommand, SearchButtons, dispatch,
};
pub use cached_resource::{CacheInfo, CachedResource, RemoteDocument};
pub use config::Config;
pub use crossref::{CrossRefMap, CrossRefRecord, CrossRefResolver};
pub use error::CardlinkError;
pub use models::{CardDescriptor, CatalogId, Marketplace, NormalizedQuery};
pub use normalize::{Normalizer, NormalizerConfig};
pub use query::{CardmarketQuery, QueryBuilder, encode_uri_component};
pub use set_abbreviations::{AbbreviationMap, AbbreviationResolver, normalize_set_key};
pub use source::{DocumentSource, HttpSource, StaticSource};
pub use store::{Clock, FileStore, KeyValueStore, ManualClock, MemoryStore, SystemClock};
pub use tabs::{OpenStrategy, TabOpener, TabRegistry, WindowHost};

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything needed to turn scraped card text into links, wired from one
/// [`Config`]. Both resolvers share the store and the document source.
pub struct CardLinks<S> {
    config: Config,
    queries: QueryBuilder,
    abbreviations: AbbreviationResolver<S>,
    crossref: CrossRefResolver<S>,
    store: Arc<dyn KeyValueStore>,
}

impl<S: DocumentSource> CardLinks<S> {
    pub fn new(
        config: Config,
        source: Arc<S>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let queries = QueryBuilder::new(Normalizer::new(&config.normalizer), config.urls.clone());
        let abbreviations = AbbreviationResolver::new(
            &config.set_abbreviations,
            Arc::clone(&source),
            Arc::clone(&store),
            Arc::clone(&clock),
        );
        let crossref =
            CrossRefResolver::new(&config.cross_reference, source, Arc::clone(&store), clock);

        CardLinks {
            config,
            queries,
            abbreviations,
            crossref,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queries(&self) -> &QueryBuilder {
        &self.queries
    }

    pub fn abbreviations(&self) -> &AbbreviationResolver<S> {
        &self.abbreviations
    }

    pub fn crossref(&self) -> &CrossRefResolver<S> {
        &self.crossref
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn buttons(&self) -> ButtonFactory<'_, S> {
        ButtonFactory::new(&self.queries, &self.abbreviations, &self.crossref)
    }

    pub fn origin_policy(&self) -> OriginPolicy {
        OriginPolicy::new(&self.config.broker.trusted_host)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config.broker)
    }

    /// Acknowledgement deadline for broker requests.
    pub fn request_timeout(&self) -> Duration {
        self.config.broker.request_timeout()
    }

    /// The configured same-origin bus for pages of `origin`.
    pub fn broadcast_bus(&self, origin: &str) -> BroadcastBus {
        BroadcastBus::from_config(origin, &self.config.broker)
    }

    /// Load both lookup tables concurrently. Returns their entry counts.
    pub async fn preload(&self) -> (usize, usize) {
        let (abbreviations, crossref) =
            tokio::join!(self.abbreviations.preload(), self.crossref.preload());
        info!(abbreviations, crossref, "Lookup tables ready");
        (abbreviations, crossref)
    }
}

impl CardLinks<HttpSource> {
    /// HTTP source with the on-disk store.
    pub fn from_config(config: Config) -> Result<Self, CardlinkError> {
        let store = FileStore::in_cache_dir(config.cache_dir.clone())?;
        info!(path = %store.path().display(), "Using persistent store");
        Ok(CardLinks::new(
            config,
            Arc::new(HttpSource::new()?),
            Arc::new(store),
            Arc::new(SystemClock),
        ))
    }

    /// HTTP source with a throwaway in-memory store.
    pub fn without_persistence(config: Config) -> Result<Self, CardlinkError> {
        Ok(CardLinks::new(
            config,
            Arc::new(HttpSource::new()?),
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
        ))
    }
}
