//! Canned [`DocumentSource`] that records every fetch.

use super::DocumentSource;
use crate::error::CardlinkError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Response {
    Document(serde_json::Value),
    Status(u16),
}

#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    responses: Arc<Mutex<HashMap<String, Response>>>,
    fetches: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every fetch after sleeping for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn serve(&self, url: &str, document: serde_json::Value) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), Response::Document(document));
    }

    /// Answer `url` with an HTTP error status.
    pub fn fail(&self, url: &str, status: u16) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), Response::Status(status));
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl DocumentSource for StaticSource {
    async fn fetch_document(&self, url: &str) -> Result<serde_json::Value, CardlinkError> {
        self.fetches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned();
        match response {
            Some(Response::Document(document)) => Ok(document),
            Some(Response::Status(status)) => Err(CardlinkError::Http {
                status,
                url: url.to_string(),
            }),
            None => Err(CardlinkError::Http {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}
