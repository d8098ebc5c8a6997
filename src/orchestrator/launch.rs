//! Starting and stopping runs.

use chrono::Utc;
use tracing::{debug, info};

use super::{with_session, Orchestrator, OrchestratorError};
use crate::model::{NewTestRun, RunStatus, TestRun};
use crate::storage::StorageError;

impl Orchestrator {
    /// Start one remote run of a configuration and begin monitoring it.
    ///
    /// Nothing is written locally unless the controller hands back a run id.
    pub async fn launch(
        &self,
        config_id: i64,
        environment_id: i64,
        device_id: i64,
        created_by: Option<&str>,
    ) -> Result<TestRun, OrchestratorError> {
        let config = self.load_configuration(config_id)?;
        if self.store.get_environment(environment_id)?.is_none() {
            return Err(OrchestratorError::NotFound {
                entity: "environment",
                id: environment_id.to_string(),
            });
        }
        if self.store.get_device(device_id)?.is_none() {
            return Err(OrchestratorError::NotFound {
                entity: "device",
                id: device_id.to_string(),
            });
        }

        let target = self.controller.target().to_string();
        let (remote_test_id, remote_run_id) =
            with_session(self.controller.as_ref(), |session| async move {
                let remote_test_id = match config.remote_test_id_for(&target) {
                    Some(id) => id.to_string(),
                    None => self.create_remote_test(session.as_ref(), &config).await?,
                };

                let remote_run_id = session
                    .run_test(&remote_test_id)
                    .await?
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| {
                        OrchestratorError::Launch(format!(
                            "controller returned no run id for test {}",
                            remote_test_id
                        ))
                    })?;
                Ok((remote_test_id, remote_run_id))
            })
            .await?;

        let run = self.store.insert_run(&NewTestRun {
            test_config_id: config_id,
            environment_id,
            device_id,
            remote_test_id,
            remote_run_id,
            status: RunStatus::Running,
            start_time: Some(Utc::now()),
            created_by: created_by.map(str::to_string),
        })?;
        info!(
            run_id = run.id,
            remote_test_id = %run.remote_test_id,
            remote_run_id = %run.remote_run_id,
            "run launched"
        );

        self.monitors.spawn(self.clone(), run.id).await;
        Ok(run)
    }

    /// Stop a running run on the controller and mark it stopped.
    ///
    /// Rejected without touching the controller unless the run is running.
    pub async fn stop(&self, run_id: i64) -> Result<TestRun, OrchestratorError> {
        let run = self.load_run(run_id)?;
        if run.status != RunStatus::Running {
            return Err(OrchestratorError::InvalidState {
                run_id,
                expected: "running",
                actual: run.status,
            });
        }

        let remote_test_id = run.remote_test_id.clone();
        with_session(self.controller.as_ref(), |session| async move {
            match session.stop_test(&remote_test_id).await {
                Ok(()) => Ok(()),
                Err(e) if e.is_not_found() => {
                    debug!(run_id, "remote test already stopped");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        })
        .await?;

        let transition = run
            .finish(RunStatus::Stopped, Utc::now(), None)
            .map_err(|e| OrchestratorError::InvalidState {
                run_id,
                expected: "running",
                actual: e.from,
            })?;

        match self.store.transition_run(run_id, &transition) {
            Ok(stopped) => {
                info!(run_id, duration = ?stopped.duration, "run stopped");
                Ok(stopped)
            }
            Err(StorageError::Conflict { .. }) => {
                let current = self.load_run(run_id)?;
                Err(OrchestratorError::InvalidState {
                    run_id,
                    expected: "running",
                    actual: current.status,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
