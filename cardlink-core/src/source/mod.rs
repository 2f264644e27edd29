pub mod client;
pub mod static_source;

pub use client::HttpSource;
pub use static_source::StaticSource;

use crate::error::CardlinkError;
use std::future::Future;

/// Where remote lookup tables come from.
pub trait DocumentSource: Send + Sync {
    /// Fetch and parse one JSON document. A non-success status is an error.
    fn fetch_document(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<serde_json::Value, CardlinkError>> + Send;
}
