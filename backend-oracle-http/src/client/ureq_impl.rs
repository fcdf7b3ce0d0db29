use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::http_trait::HttpClient;

/// Small blocking HTTP client on top of ureq, wrapped in the async trait
/// for compatibility. Requests run sequentially; fine for light use and
/// tiny binaries, not for bulk scans.
#[derive(Clone)]
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(std::time::Duration::from_secs(30))
                .build(),
        }
    }

    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build(),
        }
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for UreqClient {
    async fn get(&self, url: &str, query_params: &[(&str, String)]) -> Result<String> {
        let mut request = self.agent.get(url);
        for (key, value) in query_params {
            request = request.query(key, value);
        }

        let response = request
            .call()
            .map_err(|e| anyhow!("HTTP GET request failed: {e}"))?
            .into_string()
            .map_err(|e| anyhow!("failed to read response body: {e}"))?;

        Ok(response)
    }
}
