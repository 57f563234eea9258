//! # HTTP Store Backend
//!
//! ## Purpose
//! Talks to a remote bucket gateway over plain HTTP: objects are fetched by
//! key path, listings come back as JSON, and the sync status objects are
//! written with PUT. This is the production backend; the gateway fronts the
//! actual object storage.

use super::{validate_key, ObjectStore};
use crate::errors::{Result, SyncError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Object store speaking to a remote bucket gateway.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ListKeysResponse {
    keys: Vec<String>,
}

impl HttpObjectStore {
    /// Builds a store for one bucket behind `base_url`.
    pub fn new(base_url: &str, bucket: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("legal-index-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::StoreUnavailable {
                operation: "initialize http client".to_string(),
                details: e.to_string(),
            })?;

        Ok(HttpObjectStore {
            client,
            base_url: format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                bucket.trim_matches('/')
            ),
        })
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let url = self.url_for(key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::StoreUnavailable {
                operation: format!("get {}", key),
                details: e.to_string(),
            })?;

        match response.status() {
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| SyncError::StoreUnavailable {
                        operation: format!("get {}", key),
                        details: e.to_string(),
                    })?;
                Ok(Some(bytes.to_vec()))
            }
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => Err(SyncError::StoreUnavailable {
                operation: format!("get {}", key),
                details: format!("unexpected status {}", status),
            }),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("list", "keys"), ("prefix", prefix)])
            .send()
            .await
            .map_err(|e| SyncError::StoreUnavailable {
                operation: format!("list prefix '{}'", prefix),
                details: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(SyncError::StoreUnavailable {
                operation: format!("list prefix '{}'", prefix),
                details: format!("unexpected status {}", response.status()),
            });
        }

        let mut listing: ListKeysResponse =
            response
                .json()
                .await
                .map_err(|e| SyncError::StoreUnavailable {
                    operation: format!("list prefix '{}'", prefix),
                    details: format!("invalid listing body: {}", e),
                })?;
        listing.keys.sort();
        debug!(prefix = prefix, count = listing.keys.len(), "listed remote objects");
        Ok(listing.keys)
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        validate_key(key)?;
        let url = self.url_for(key);
        let response = self
            .client
            .put(&url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| SyncError::StoreUnavailable {
                operation: format!("put {}", key),
                details: e.to_string(),
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SyncError::StoreUnavailable {
                operation: format!("put {}", key),
                details: format!("unexpected status {}", response.status()),
            })
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let url = self.url_for(key);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| SyncError::StoreUnavailable {
                operation: format!("delete {}", key),
                details: e.to_string(),
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Ok(()),
            status => Err(SyncError::StoreUnavailable {
                operation: format!("delete {}", key),
                details: format!("unexpected status {}", status),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_found_and_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/norm/eli/2024/regelungstext-1.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"<akn/>".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/norm/missing.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(&server.uri(), "norm", 5).unwrap();
        assert_eq!(
            store.get("eli/2024/regelungstext-1.xml").await.unwrap(),
            Some(b"<akn/>".to_vec())
        );
        assert_eq!(store.get("missing.xml").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/norm/doc.xml"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(&server.uri(), "norm", 5).unwrap();
        let err = store.get("doc.xml").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_list_keys_parses_gateway_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/norm"))
            .and(query_param("prefix", "changelogs/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": [
                    "changelogs/2024-01-02T00:00:00Z-changelog.json",
                    "changelogs/2024-01-01T00:00:00Z-changelog.json"
                ]
            })))
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(&server.uri(), "norm", 5).unwrap();
        let keys = store.list_keys("changelogs/").await.unwrap();
        // listing order is normalized even if the gateway is not sorted
        assert_eq!(
            keys,
            vec![
                "changelogs/2024-01-01T00:00:00Z-changelog.json".to_string(),
                "changelogs/2024-01-02T00:00:00Z-changelog.json".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_put_and_delete_status_objects() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/norm/indexing/lock.json"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/norm/indexing/lock.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(&server.uri(), "norm", 5).unwrap();
        store
            .put("indexing/lock.json", b"{}".to_vec())
            .await
            .unwrap();
        // gateway already lost the object; treated as success
        store.delete("indexing/lock.json").await.unwrap();
    }
}
