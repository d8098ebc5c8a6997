//! Pulling run results off the controller into the record store.

use tracing::info;

use super::{with_session, Orchestrator, OrchestratorError};
use crate::model::{ResultSummary, RunStatus, TestResult};

impl Orchestrator {
    /// Fetch the raw result of a run and upsert it with its summary.
    ///
    /// Re-ingesting overwrites the stored result in place.
    pub async fn ingest(&self, run_id: i64) -> Result<TestResult, OrchestratorError> {
        let run = self.load_run(run_id)?;
        let raw = with_session(self.controller.as_ref(), |session| async move {
            Ok(session
                .get_result_summary(&run.remote_test_id, &run.remote_run_id)
                .await?)
        })
        .await?;

        let summary = ResultSummary::from_raw(&raw);
        let result = self.store.upsert_result(run_id, &raw, &summary)?;
        info!(run_id, result_id = result.id, "results ingested");
        Ok(result)
    }

    /// The stored result, ingesting on demand for a completed run that has
    /// none yet (e.g. the monitor's own ingestion failed).
    pub async fn result_for_run(&self, run_id: i64) -> Result<TestResult, OrchestratorError> {
        if let Some(result) = self.store.get_result(run_id)? {
            return Ok(result);
        }

        let run = self.load_run(run_id)?;
        if run.status != RunStatus::Completed {
            return Err(OrchestratorError::InvalidState {
                run_id,
                expected: "completed",
                actual: run.status,
            });
        }
        self.ingest(run_id).await
    }
}
