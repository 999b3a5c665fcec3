//! Compute endpoint client — fire-and-forget job submission
//!
//! Both submissions return once the request is accepted for processing, not
//! once the computation finishes; artifact polling detects completion.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{BacktestError, EngineResult};
use crate::params::JobQuery;

const DEFAULT_BASE_URL: &str = "https://6d0p1sigrh.execute-api.eu-west-1.amazonaws.com/prod";
const MAX_SUBMIT_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

/// Job submission to the remote compute service.
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// Trigger extraction of raw swap data into the named artifact.
    async fn submit_raw_data_job(
        &self,
        pool_address: &str,
        start: NaiveDate,
        end: NaiveDate,
        file_name: &str,
    ) -> EngineResult<()>;

    /// Trigger the backtest computation described by `query`.
    async fn submit_backtest_job(&self, query: &JobQuery) -> EngineResult<()>;
}

/// HTTP client for the compute endpoint
#[derive(Clone)]
pub struct ComputeClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for ComputeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeClient {
    /// Create a client against the default compute endpoint
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Send a submission request, retrying transient failures (transport
    /// errors, 5xx) with bounded exponential backoff. 4xx is permanent and
    /// surfaces as `SubmissionRejected`.
    async fn submit_with_retry<F>(&self, job: &str, make_request: F) -> EngineResult<()>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
        let mut attempt = 1;

        loop {
            match make_request().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        debug!(job, attempt, "Job submission accepted");
                        return Ok(());
                    }

                    let body = resp.text().await.unwrap_or_default();
                    if status.is_client_error() {
                        return Err(BacktestError::SubmissionRejected(format!(
                            "{job} rejected with {status}: {body}"
                        )));
                    }
                    if attempt >= MAX_SUBMIT_ATTEMPTS {
                        return Err(BacktestError::Network(format!(
                            "{job} failed after {attempt} attempts, last status {status}: {body}"
                        )));
                    }
                    warn!(job, %status, attempt, "Submission returned server error, retrying");
                }
                Err(e) => {
                    if attempt >= MAX_SUBMIT_ATTEMPTS {
                        return Err(BacktestError::Network(format!(
                            "{job} failed after {attempt} attempts: {e}"
                        )));
                    }
                    warn!(job, error = %e, attempt, "Submission transport error, retrying");
                }
            }

            tokio::time::sleep(backoff).await;
            backoff *= 2;
            attempt += 1;
        }
    }
}

#[async_trait]
impl ComputeService for ComputeClient {
    async fn submit_raw_data_job(
        &self,
        pool_address: &str,
        start: NaiveDate,
        end: NaiveDate,
        file_name: &str,
    ) -> EngineResult<()> {
        let pool = pool_address.to_lowercase();
        let url = format!(
            "{}/swap_data/pool_query?pools={}&date_a={}&date_b={}&name_file={}",
            self.base_url, pool, start, end, file_name
        );
        debug!(pool = %pool, %start, %end, file_name, "Submitting raw swap data job");

        self.submit_with_retry("raw data job", || self.client.get(&url))
            .await
    }

    async fn submit_backtest_job(&self, query: &JobQuery) -> EngineResult<()> {
        let url = format!("{}/backtest/", self.base_url);
        let body = serde_json::json!({ "df": query });
        debug!(file_name = %query.file_name, "Submitting backtest job");

        self.submit_with_retry("backtest job", || self.client.post(&url).json(&body))
            .await
    }
}
