//! Background polling of remote run status until a terminal state.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{with_session, Orchestrator, OrchestratorError};
use crate::controller::map_remote_status;
use crate::model::{RunStatus, TestRun};
use crate::storage::StorageError;

/// Timing and bounds for the status polling loop.
#[derive(Debug, Clone)]
pub struct MonitorPolicy {
    /// Pause after a successful non-terminal poll.
    pub poll_interval: Duration,
    /// Pause after a failed poll. Shorter than `poll_interval`.
    pub error_backoff: Duration,
    /// Give up after this many failed polls in a row. `None` polls forever.
    pub max_consecutive_errors: Option<u32>,
    /// Give up once a run has been active this long. `None` waits forever.
    pub max_duration: Option<Duration>,
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            error_backoff: Duration::from_secs(5),
            max_consecutive_errors: Some(120),
            max_duration: Some(Duration::from_secs(24 * 60 * 60)),
        }
    }
}

/// How a monitor task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The monitor committed this terminal status from the controller's verdict.
    Settled(RunStatus),
    /// Someone else (a stop, a status refresh) moved the run first.
    Superseded(RunStatus),
    /// Bounds exhausted; the run was forced to failed.
    GaveUp { reason: String },
    /// The run record disappeared.
    Missing,
}

/// One monitor task per run, at most.
#[derive(Default)]
pub struct MonitorRegistry {
    tasks: Mutex<HashMap<i64, JoinHandle<MonitorOutcome>>>,
}

impl MonitorRegistry {
    /// Start monitoring `run_id` unless a live monitor already exists.
    /// Returns whether a task was spawned.
    pub async fn spawn(&self, orchestrator: Orchestrator, run_id: i64) -> bool {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, h| !h.is_finished());
        if tasks.contains_key(&run_id) {
            return false;
        }
        let handle = tokio::spawn(async move { orchestrator.monitor_run(run_id).await });
        tasks.insert(run_id, handle);
        true
    }

    /// Wait for the monitor of `run_id` to finish.
    pub async fn join(&self, run_id: i64) -> Option<MonitorOutcome> {
        let handle = self.tasks.lock().await.remove(&run_id)?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(run_id, error = %e, "monitor task panicked or was aborted");
                None
            }
        }
    }

    /// Runs with a monitor still polling, ascending.
    pub async fn active(&self) -> Vec<i64> {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, h| !h.is_finished());
        let mut ids: Vec<i64> = tasks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Abort every monitor. Used at shutdown; runs stay `running` and are
    /// picked up again on the next start.
    pub async fn abort_all(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}

impl Orchestrator {
    /// Poll the controller until the run reaches a terminal state.
    ///
    /// Status query errors never leave this loop; they back off and retry
    /// until the policy bounds are exhausted.
    pub async fn monitor_run(&self, run_id: i64) -> MonitorOutcome {
        let mut consecutive_errors: u32 = 0;
        info!(run_id, "monitor started");

        loop {
            let run = match self.store.get_run(run_id) {
                Ok(Some(run)) => run,
                Ok(None) => {
                    warn!(run_id, "run disappeared; monitor exiting");
                    return MonitorOutcome::Missing;
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(run_id, error = %e, consecutive_errors, "cannot load run");
                    if self.errors_exhausted(consecutive_errors) {
                        error!(run_id, "giving up on run after repeated storage failures");
                        return MonitorOutcome::GaveUp {
                            reason: format!("storage unavailable: {}", e),
                        };
                    }
                    tokio::time::sleep(self.policy.error_backoff).await;
                    continue;
                }
            };

            if run.status != RunStatus::Running {
                debug!(run_id, status = %run.status, "run no longer running; monitor exiting");
                return MonitorOutcome::Superseded(run.status);
            }

            let failure = match self.poll_remote(&run).await {
                Ok(status) if status.is_terminal() => match self.settle(&run, status).await {
                    Ok(outcome) => return outcome,
                    Err(e) => e,
                },
                Ok(status) => {
                    debug!(run_id, remote_status = %status, "run still in progress");
                    consecutive_errors = 0;
                    if let Some(reason) = self.deadline_passed(&run) {
                        return self.give_up(&run, reason).await;
                    }
                    tokio::time::sleep(self.policy.poll_interval).await;
                    continue;
                }
                Err(e) => e,
            };

            consecutive_errors += 1;
            warn!(run_id, error = %failure, consecutive_errors, "status poll failed");
            if self.errors_exhausted(consecutive_errors) {
                let reason = format!(
                    "{} consecutive status queries failed; last error: {}",
                    consecutive_errors, failure
                );
                return self.give_up(&run, reason).await;
            }
            if let Some(reason) = self.deadline_passed(&run) {
                return self.give_up(&run, reason).await;
            }
            tokio::time::sleep(self.policy.error_backoff).await;
        }
    }

    /// The controller gets a final poll before the deadline is enforced, so a
    /// run that finished during downtime still settles normally.
    fn deadline_passed(&self, run: &TestRun) -> Option<String> {
        let limit = self.policy.max_duration?;
        (active_for(run) >= limit).then(|| {
            format!(
                "no terminal status within {}s; monitoring abandoned",
                limit.as_secs()
            )
        })
    }

    fn errors_exhausted(&self, consecutive_errors: u32) -> bool {
        self.policy
            .max_consecutive_errors
            .is_some_and(|max| consecutive_errors >= max)
    }

    /// One status query, mapped onto the local vocabulary.
    async fn poll_remote(&self, run: &TestRun) -> Result<RunStatus, OrchestratorError> {
        let test_id = run.remote_test_id.clone();
        let run_id = run.remote_run_id.clone();
        with_session(self.controller.as_ref(), |session| async move {
            let raw = session.get_status(&test_id, &run_id).await?;
            Ok(map_remote_status(&raw)?)
        })
        .await
    }

    /// Commit a terminal status observed on the controller, then ingest
    /// results best-effort for completed and failed runs.
    ///
    /// A lost compare-and-swap is not an error: whoever won decided the state.
    async fn settle(
        &self,
        run: &TestRun,
        status: RunStatus,
    ) -> Result<MonitorOutcome, OrchestratorError> {
        let transition = match run.finish(status, Utc::now(), None) {
            Ok(t) => t,
            Err(e) => {
                warn!(run_id = run.id, error = %e, "cannot settle run");
                return Ok(MonitorOutcome::Superseded(run.status));
            }
        };

        match self.store.transition_run(run.id, &transition) {
            Ok(done) => {
                info!(run_id = run.id, status = %status, duration = ?done.duration, "run finished");
                if matches!(status, RunStatus::Completed | RunStatus::Failed) {
                    if let Err(e) = self.ingest(run.id).await {
                        warn!(
                            run_id = run.id,
                            error = %e,
                            "result ingestion failed; results can be fetched on demand"
                        );
                    }
                }
                Ok(MonitorOutcome::Settled(status))
            }
            Err(StorageError::Conflict { .. }) => {
                let current = self.load_run(run.id)?;
                info!(run_id = run.id, status = %current.status, "run settled concurrently");
                Ok(MonitorOutcome::Superseded(current.status))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Force the run to failed with `reason`.
    async fn give_up(&self, run: &TestRun, reason: String) -> MonitorOutcome {
        error!(run_id = run.id, reason = %reason, "monitor giving up");
        let transition = match run.finish(RunStatus::Failed, Utc::now(), Some(reason.clone())) {
            Ok(t) => t,
            Err(_) => return MonitorOutcome::Superseded(run.status),
        };

        match self.store.transition_run(run.id, &transition) {
            Ok(_) => MonitorOutcome::GaveUp { reason },
            Err(StorageError::Conflict { .. }) => match self.store.get_run(run.id) {
                Ok(Some(current)) => MonitorOutcome::Superseded(current.status),
                _ => MonitorOutcome::Missing,
            },
            Err(e) => {
                error!(run_id = run.id, error = %e, "cannot mark run failed");
                MonitorOutcome::GaveUp { reason }
            }
        }
    }

    /// Re-attach monitors to every run still marked running. Returns how
    /// many were started.
    pub async fn resume_active_runs(&self) -> Result<usize, OrchestratorError> {
        let running = self.store.list_runs(Some(RunStatus::Running), i64::MAX)?;
        let mut started = 0;
        for run in running {
            if self.monitors.spawn(self.clone(), run.id).await {
                started += 1;
            }
        }
        if started > 0 {
            info!(count = started, "resumed run monitors");
        }
        Ok(started)
    }

    /// Current status of a run, asking the controller once when the run is
    /// still active locally. A terminal answer is committed the same way the
    /// monitor commits it.
    pub async fn refresh_status(&self, run_id: i64) -> Result<TestRun, OrchestratorError> {
        let run = self.load_run(run_id)?;
        if run.status != RunStatus::Running {
            return Ok(run);
        }

        let status = self.poll_remote(&run).await?;
        if status.is_terminal() {
            self.settle(&run, status).await?;
            return self.load_run(run_id);
        }
        Ok(run)
    }
}

/// Time since the run started, zero when it has no start time or the clock
/// went backwards.
fn active_for(run: &TestRun) -> Duration {
    run.start_time
        .and_then(|start| (Utc::now() - start).to_std().ok())
        .unwrap_or(Duration::ZERO)
}
