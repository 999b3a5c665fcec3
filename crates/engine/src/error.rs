//! Error taxonomy for the backtest orchestration pipeline

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    /// Malformed input, caught before any network call is made.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The compute endpoint rejected the job request (4xx); not retryable
    /// without the caller changing parameters.
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// Polling deadline exceeded while waiting for an artifact.
    #[error("artifact {file_name} not ready after {waited:?}")]
    ArtifactTimeout { file_name: String, waited: Duration },

    /// The requested pool key is absent from the result map.
    #[error("pool {0} not found in result map")]
    PoolNotFound(String),

    /// The result artifact failed structural validation.
    #[error("malformed result: {0}")]
    MalformedResult(String),

    /// Transient transport failure during submission, polling, or fetch.
    #[error("network error: {0}")]
    Network(String),

    /// The run was cancelled by the caller.
    #[error("run cancelled")]
    Cancelled,
}

pub type EngineResult<T> = Result<T, BacktestError>;
