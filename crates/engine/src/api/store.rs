//! Artifact store client — S3-style object store addressed by file name
//!
//! Existence probes are metadata-only HEAD requests and never mutate remote
//! state; content fetches are plain GETs returning JSON.

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::{BacktestError, EngineResult};

const DEFAULT_BASE_URL: &str = "https://signedpayloads.s3.eu-west-1.amazonaws.com";

/// Read-only access to the artifact store.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Lightweight existence probe for an artifact.
    async fn exists(&self, file_name: &str) -> EngineResult<bool>;

    /// Fetch the artifact content as JSON.
    async fn fetch_json(&self, file_name: &str) -> EngineResult<serde_json::Value>;

    /// Absolute URL of an artifact, as embedded in job queries.
    fn artifact_url(&self, file_name: &str) -> String;
}

#[async_trait]
impl<T: ArtifactStore + ?Sized> ArtifactStore for std::sync::Arc<T> {
    async fn exists(&self, file_name: &str) -> EngineResult<bool> {
        (**self).exists(file_name).await
    }

    async fn fetch_json(&self, file_name: &str) -> EngineResult<serde_json::Value> {
        (**self).fetch_json(file_name).await
    }

    fn artifact_url(&self, file_name: &str) -> String {
        (**self).artifact_url(file_name)
    }
}

/// HTTP client for the signed-payloads artifact bucket
#[derive(Clone)]
pub struct ArtifactStoreClient {
    client: Client,
    base_url: Url,
}

impl Default for ArtifactStoreClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStoreClient {
    /// Create a client against the default artifact bucket
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: Url::parse(base_url).expect("Invalid artifact store base URL"),
        }
    }

    /// Object URL with the artifact name percent-encoded as a single path
    /// segment. Backtest result names contain `%` and must be escaped
    /// before use as a fetch path.
    fn object_url(&self, file_name: &str) -> Url {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .expect("artifact store base URL cannot be a base")
            .pop_if_empty()
            .push(file_name);
        url
    }
}

#[async_trait]
impl ArtifactStore for ArtifactStoreClient {
    async fn exists(&self, file_name: &str) -> EngineResult<bool> {
        let url = self.object_url(file_name);
        debug!(%url, "Probing artifact");

        let resp = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| BacktestError::Network(format!("artifact probe failed: {e}")))?;

        Ok(resp.status().is_success())
    }

    async fn fetch_json(&self, file_name: &str) -> EngineResult<serde_json::Value> {
        let url = self.object_url(file_name);
        debug!(%url, "Fetching artifact");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BacktestError::Network(format!("artifact fetch failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BacktestError::Network(format!(
                "artifact store error {status}: {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| BacktestError::MalformedResult(format!("artifact is not valid JSON: {e}")))
    }

    fn artifact_url(&self, file_name: &str) -> String {
        self.object_url(file_name).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_url_joins_path() {
        let store = ArtifactStoreClient::with_base_url("https://store.test");
        assert_eq!(
            store.artifact_url("swap_results0xabc2021-06-012021-06-10"),
            "https://store.test/swap_results0xabc2021-06-012021-06-10"
        );
    }

    #[test]
    fn test_artifact_url_escapes_result_names() {
        // Round trip: the name the job was told to write, percent-escaped
        // once, resolves the same object on fetch.
        let store = ArtifactStoreClient::with_base_url("https://store.test");
        let name = "bt_resultsWETH-USDC-0.3%,Fix_0D,1000,2000,0,2021-06-01,5000,40";
        let url = store.artifact_url(name);
        assert_eq!(
            url,
            "https://store.test/bt_resultsWETH-USDC-0.3%25,Fix_0D,1000,2000,0,2021-06-01,5000,40"
        );

        // The escaped path decodes back to the unescaped artifact name.
        let parsed = Url::parse(&url).unwrap();
        let segment = parsed.path_segments().unwrap().next_back().unwrap();
        assert_eq!(segment.replace("%25", "%"), name);
    }

    #[test]
    fn test_artifact_url_with_base_path() {
        let store = ArtifactStoreClient::with_base_url("https://store.test/bucket");
        assert_eq!(
            store.artifact_url("file-a"),
            "https://store.test/bucket/file-a"
        );
    }
}
