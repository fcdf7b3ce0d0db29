use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::http_trait::HttpClient;

/// Async HTTP client on top of reqwest: connection pooling and real
/// concurrency, the right choice when driving many per-height requests.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("reqwest client with static configuration"),
        }
    }

    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()
                .expect("reqwest client with static configuration"),
        }
    }

    /// Wrap a preconfigured reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str, query_params: &[(&str, String)]) -> Result<String> {
        let mut request = self.client.get(url);
        for (key, value) in query_params {
            request = request.query(&[(key, value)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("HTTP GET request failed: {e}"))?
            .error_for_status()
            .map_err(|e| anyhow!("HTTP GET request returned error status: {e}"))?
            .text()
            .await
            .map_err(|e| anyhow!("failed to read response body: {e}"))?;

        Ok(response)
    }
}
