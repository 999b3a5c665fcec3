//! Backtest pipeline orchestration
//!
//! Sole owner of the pipeline sequencing: submit raw data extraction, poll
//! for the raw artifact, submit the backtest, poll for the result artifact,
//! decode. Components never call each other directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use crate::api::compute::ComputeService;
use crate::api::store::ArtifactStore;
use crate::decoder;
use crate::error::{BacktestError, EngineResult};
use crate::params;
use crate::poller::{self, DEFAULT_POLL_INTERVAL};
use crate::types::{BacktestResult, DateRange, StrategyConfig};

/// Default ceiling on how long to wait for either artifact.
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(900);

/// Pipeline phase of the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Idle,
    SubmittingRawData,
    PollingRawData,
    SubmittingBacktest,
    PollingBacktest,
    Decoding,
    Succeeded,
    Failed,
}

/// Shared progress/state for one orchestrator
pub struct RunProgress {
    pub status: RwLock<RunStatus>,
    pub cancelled: AtomicBool,
    pub error_message: RwLock<Option<String>>,
}

impl RunProgress {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(RunStatus::Idle),
            cancelled: AtomicBool::new(false),
            error_message: RwLock::new(None),
        }
    }

    fn reset(&self) {
        *self.status.write().unwrap() = RunStatus::Idle;
        self.cancelled.store(false, Ordering::Relaxed);
        *self.error_message.write().unwrap() = None;
    }

    pub fn status(&self) -> RunStatus {
        *self.status.read().unwrap()
    }

    fn set_status(&self, status: RunStatus) {
        *self.status.write().unwrap() = status;
    }

    /// Stop future poll iterations and phase transitions at the next
    /// suspension point. In-flight requests may complete; their results
    /// are discarded.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequences the two-phase pipeline against the compute service and the
/// artifact store.
pub struct BacktestOrchestrator<C, S> {
    compute: C,
    store: S,
    poll_interval: Duration,
    poll_deadline: Duration,
    progress: Arc<RunProgress>,
}

impl<C: ComputeService, S: ArtifactStore> BacktestOrchestrator<C, S> {
    pub fn new(compute: C, store: S) -> Self {
        Self {
            compute,
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_deadline: DEFAULT_POLL_DEADLINE,
            progress: Arc::new(RunProgress::new()),
        }
    }

    pub fn with_polling(mut self, interval: Duration, deadline: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_deadline = deadline;
        self
    }

    pub fn progress(&self) -> Arc<RunProgress> {
        Arc::clone(&self.progress)
    }

    pub fn cancel(&self) {
        self.progress.cancel();
    }

    /// Run the full pipeline for one validated strategy config. No
    /// automatic whole-pipeline retry: on failure the caller re-invokes.
    pub async fn run(&self, config: &StrategyConfig) -> EngineResult<BacktestResult> {
        self.progress.reset();

        match self.run_inner(config).await {
            Ok(result) => {
                self.progress.set_status(RunStatus::Succeeded);
                info!(points = result.len(), "Backtest run succeeded");
                Ok(result)
            }
            Err(e) => {
                *self.progress.error_message.write().unwrap() = Some(e.to_string());
                self.progress.set_status(RunStatus::Failed);
                error!(error = %e, "Backtest run failed");
                Err(e)
            }
        }
    }

    async fn run_inner(&self, config: &StrategyConfig) -> EngineResult<BacktestResult> {
        config.validate()?;

        let pool_name = config.pool.name();
        let raw_handle = params::raw_data_handle(&config.pool.address, &config.range);

        self.transition(RunStatus::SubmittingRawData)?;
        info!(file_name = %raw_handle.file_name, "Submitting raw swap data job");
        self.compute
            .submit_raw_data_job(
                &config.pool.address,
                config.range.start,
                config.range.end,
                &raw_handle.file_name,
            )
            .await?;

        self.transition(RunStatus::PollingRawData)?;
        poller::await_artifact(
            &self.store,
            &raw_handle,
            self.poll_interval,
            self.poll_deadline,
            &self.progress.cancelled,
        )
        .await?;

        // Parameters are built once; the same handle drives both the
        // submission and the later polling.
        let data_url = self.store.artifact_url(&raw_handle.file_name);
        let (query, bt_handle) = params::build_parameters(config, &data_url);

        self.transition(RunStatus::SubmittingBacktest)?;
        info!(file_name = %bt_handle.file_name, "Submitting backtest job");
        self.compute.submit_backtest_job(&query).await?;

        self.transition(RunStatus::PollingBacktest)?;
        poller::await_artifact(
            &self.store,
            &bt_handle,
            self.poll_interval,
            self.poll_deadline,
            &self.progress.cancelled,
        )
        .await?;

        self.transition(RunStatus::Decoding)?;
        decoder::fetch_and_decode(&self.store, &bt_handle, &pool_name).await
    }

    fn transition(&self, status: RunStatus) -> EngineResult<()> {
        if self.progress.is_cancelled() {
            return Err(BacktestError::Cancelled);
        }
        self.progress.set_status(status);
        Ok(())
    }
}

/// Submit a raw swap data extraction, wait for the artifact, and fetch its
/// content. The full pipeline only needs the artifact's existence; this is
/// the standalone download path.
pub async fn download_raw_swaps<C, S>(
    compute: &C,
    store: &S,
    pool_address: &str,
    range: &DateRange,
    interval: Duration,
    deadline: Duration,
    cancelled: &AtomicBool,
) -> EngineResult<serde_json::Value>
where
    C: ComputeService + ?Sized,
    S: ArtifactStore + ?Sized,
{
    let handle = params::raw_data_handle(pool_address, range);

    info!(file_name = %handle.file_name, "Submitting raw swap data job");
    compute
        .submit_raw_data_job(pool_address, range.start, range.end, &handle.file_name)
        .await?;

    poller::await_artifact(store, &handle, interval, deadline, cancelled).await?;
    store.fetch_json(&handle.file_name).await
}
