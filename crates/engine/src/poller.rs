//! Poll-until-present primitive for remote artifacts
//!
//! The compute service exposes completion only through artifact existence,
//! so readiness detection is a probe loop: check, sleep, check again. The
//! deadline bounds the total wait; cancellation stops further probes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::store::ArtifactStore;
use crate::error::{BacktestError, EngineResult};
use crate::types::ArtifactHandle;

/// Default spacing between existence probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Wait until the artifact exists. Returns immediately on the first
/// successful probe; `ArtifactTimeout` once `deadline` elapses;
/// `Cancelled` as soon as the flag is observed raised.
pub async fn await_artifact<S: ArtifactStore + ?Sized>(
    store: &S,
    handle: &ArtifactHandle,
    interval: Duration,
    deadline: Duration,
    cancelled: &AtomicBool,
) -> EngineResult<()> {
    let started = Instant::now();

    loop {
        if cancelled.load(Ordering::Relaxed) {
            debug!(file_name = %handle.file_name, "Polling cancelled");
            return Err(BacktestError::Cancelled);
        }

        match store.exists(&handle.file_name).await {
            Ok(true) => {
                debug!(
                    file_name = %handle.file_name,
                    waited = ?started.elapsed(),
                    "Artifact ready"
                );
                return Ok(());
            }
            Ok(false) => {}
            // A failed probe counts as "not yet present"; the deadline
            // bounds the total wait either way.
            Err(e) => {
                warn!(file_name = %handle.file_name, error = %e, "Artifact probe failed")
            }
        }

        if started.elapsed() >= deadline {
            return Err(BacktestError::ArtifactTimeout {
                file_name: handle.file_name.clone(),
                waited: started.elapsed(),
            });
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArtifactKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ProbeStore {
        /// Number of probes that report "absent" before the artifact exists.
        absent_probes: usize,
        probe_times: Mutex<Vec<Instant>>,
        fail_probes: bool,
    }

    impl ProbeStore {
        fn ready_after(absent_probes: usize) -> Self {
            Self {
                absent_probes,
                probe_times: Mutex::new(Vec::new()),
                fail_probes: false,
            }
        }

        fn probe_count(&self) -> usize {
            self.probe_times.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ArtifactStore for ProbeStore {
        async fn exists(&self, _file_name: &str) -> EngineResult<bool> {
            let mut times = self.probe_times.lock().unwrap();
            times.push(Instant::now());
            let count = times.len();
            drop(times);

            if self.fail_probes {
                return Err(BacktestError::Network("probe refused".into()));
            }
            Ok(count > self.absent_probes)
        }

        async fn fetch_json(&self, _file_name: &str) -> EngineResult<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }

        fn artifact_url(&self, file_name: &str) -> String {
            format!("https://store.test/{file_name}")
        }
    }

    fn handle() -> ArtifactHandle {
        ArtifactHandle {
            file_name: "bt_resultstest".into(),
            kind: ArtifactKind::BacktestResult,
        }
    }

    #[tokio::test]
    async fn test_returns_immediately_when_artifact_exists() {
        let store = ProbeStore::ready_after(0);
        let cancelled = AtomicBool::new(false);
        let started = Instant::now();

        await_artifact(
            &store,
            &handle(),
            Duration::from_secs(5),
            Duration::from_secs(60),
            &cancelled,
        )
        .await
        .unwrap();

        assert_eq!(store.probe_count(), 1);
        // No spurious wait before or after the first probe.
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_probe_spacing_is_at_least_interval() {
        let store = ProbeStore::ready_after(3);
        let cancelled = AtomicBool::new(false);
        let interval = Duration::from_millis(20);

        await_artifact(
            &store,
            &handle(),
            interval,
            Duration::from_secs(60),
            &cancelled,
        )
        .await
        .unwrap();

        let times = store.probe_times.lock().unwrap();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
    }

    #[tokio::test]
    async fn test_deadline_exhaustion_is_artifact_timeout() {
        let store = ProbeStore::ready_after(usize::MAX);
        let cancelled = AtomicBool::new(false);

        let err = await_artifact(
            &store,
            &handle(),
            Duration::from_millis(10),
            Duration::from_millis(35),
            &cancelled,
        )
        .await
        .unwrap_err();

        match err {
            BacktestError::ArtifactTimeout { file_name, waited } => {
                assert_eq!(file_name, "bt_resultstest");
                assert!(waited >= Duration::from_millis(35));
            }
            other => panic!("expected ArtifactTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_probe_errors_count_as_absent_until_deadline() {
        let store = ProbeStore {
            fail_probes: true,
            ..ProbeStore::ready_after(0)
        };
        let cancelled = AtomicBool::new(false);

        let err = await_artifact(
            &store,
            &handle(),
            Duration::from_millis(10),
            Duration::from_millis(25),
            &cancelled,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BacktestError::ArtifactTimeout { .. }));
        assert!(store.probe_count() >= 2);
    }

    #[tokio::test]
    async fn test_cancelled_flag_stops_probes() {
        let store = ProbeStore::ready_after(usize::MAX);
        let cancelled = AtomicBool::new(true);

        let err = await_artifact(
            &store,
            &handle(),
            Duration::from_millis(10),
            Duration::from_secs(60),
            &cancelled,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BacktestError::Cancelled));
        assert_eq!(store.probe_count(), 0);
    }
}
