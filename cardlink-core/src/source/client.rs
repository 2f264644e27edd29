use super::DocumentSource;
use crate::error::CardlinkError;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = "cardlink-core/0.1";
const ACCEPT: &str = "application/json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Fetches lookup tables over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new() -> Result<Self, CardlinkError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(USER_AGENT),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(ACCEPT),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(HttpSource { client })
    }
}

impl DocumentSource for HttpSource {
    async fn fetch_document(&self, url: &str) -> Result<serde_json::Value, CardlinkError> {
        debug!(url = %url, "Fetching remote document");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Remote document fetch failed");
            return Err(CardlinkError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let document: serde_json::Value = response.json().await?;
        debug!(url = %url, "Remote document parsed");
        Ok(document)
    }
}
