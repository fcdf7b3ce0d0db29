use anyhow::Result;
use async_trait::async_trait;

/// Minimal async HTTP client abstraction.
///
/// The oracle surface is GET-only, so one method suffices. Implement it with
/// whatever HTTP library fits your target: the bundled [`super::ReqwestClient`]
/// for async stacks, [`super::UreqClient`] for a small blocking client, or a
/// platform-specific API.
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// Perform a GET request, returning the response body.
    async fn get(&self, url: &str, query_params: &[(&str, String)]) -> Result<String>;
}
