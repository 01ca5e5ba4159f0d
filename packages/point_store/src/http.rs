//! Point store backed by an HTTP endpoint returning a JSON array.
//!
//! Used to read the entity store's public listing (e.g.
//! `GET /api/water-bodies`) without touching its database.

use std::time::Duration;

use async_trait::async_trait;
use watermap_point_models::Snapshot;

use crate::{PointStore, PointStoreError, records};

/// Fetches point records over HTTP.
pub struct HttpPointStore {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpPointStore {
    /// Creates a store fetching from `url`.
    ///
    /// # Errors
    ///
    /// Returns [`PointStoreError::InvalidConfig`] if the URL is empty or
    /// the HTTP client cannot be constructed.
    pub fn new(name: &str, url: &str, timeout_secs: u64) -> Result<Self, PointStoreError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(PointStoreError::InvalidConfig {
                message: format!("'{url}' is not an http(s) URL"),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PointStoreError::InvalidConfig {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl PointStore for HttpPointStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<Snapshot, PointStoreError> {
        log::info!("Fetching {} points from {}", self.name, self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| PointStoreError::unavailable(&self.name, e))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PointStoreError::unavailable(&self.name, e))?;

        let values = records::parse_payload(&self.name, &bytes)?;
        let points = records::points_from_json(&self.name, values, false)?;
        records::assemble(&self.name, points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            HttpPointStore::new("entities", "ftp://example.com/points", 30),
            Err(PointStoreError::InvalidConfig { .. })
        ));
        assert!(HttpPointStore::new("entities", "https://example.com/points", 30).is_ok());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let store = HttpPointStore::new("entities", "http://127.0.0.1:9/points", 2).unwrap();
        let err = store.load().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
