//! JSON-over-HTTP access

use crate::error::{BroadcastJoinError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that can answer a GET with a JSON document
#[async_trait]
pub trait JsonSource: Send + Sync {
    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value>;
}

/// `JsonSource` backed by a reqwest client
///
/// One attempt per request: a network failure, a non-2xx status or a body
/// that is not JSON is returned as an error.
#[derive(Debug, Clone)]
pub struct HttpJsonSource {
    client: Client,
}

impl HttpJsonSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("broadcast-join/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BroadcastJoinError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JsonSource for HttpJsonSource {
    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        tracing::debug!(url, ?query, "GET");
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BroadcastJoinError::Http(format!("{}: HTTP {}", url, status)));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| BroadcastJoinError::Decode(format!("{}: invalid JSON: {}", url, e)))
    }
}
