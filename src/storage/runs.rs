//! Test runs and their results.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

use super::{json_col, opt_time_col, parsed_col, time_col, ts, StorageError, Store};
use crate::model::{NewTestRun, ResultSummary, RunStatus, TestResult, TestRun, Transition};

const RUN_COLUMNS: &str = "id, test_config_id, environment_id, device_id, remote_test_id,
     remote_run_id, status, start_time, end_time, duration, failure_reason, created_by,
     version, created_at, updated_at";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<TestRun> {
    Ok(TestRun {
        id: row.get(0)?,
        test_config_id: row.get(1)?,
        environment_id: row.get(2)?,
        device_id: row.get(3)?,
        remote_test_id: row.get(4)?,
        remote_run_id: row.get(5)?,
        status: parsed_col(row, 6)?,
        start_time: opt_time_col(row, 7)?,
        end_time: opt_time_col(row, 8)?,
        duration: row.get(9)?,
        failure_reason: row.get(10)?,
        created_by: row.get(11)?,
        version: row.get(12)?,
        created_at: time_col(row, 13)?,
        updated_at: time_col(row, 14)?,
    })
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<TestResult> {
    let summary_raw = json_col(row, 3)?;
    let summary: ResultSummary = serde_json::from_value(summary_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(TestResult {
        id: row.get(0)?,
        test_run_id: row.get(1)?,
        result_data: json_col(row, 2)?,
        summary,
        created_at: time_col(row, 4)?,
        updated_at: time_col(row, 5)?,
    })
}

impl Store {
    // ========================================================================
    // Runs
    // ========================================================================

    pub fn insert_run(&self, new: &NewTestRun) -> Result<TestRun, StorageError> {
        let id = {
            let conn = self.pool().get()?;
            let now = ts(&Utc::now());
            conn.execute(
                "INSERT INTO test_runs (test_config_id, environment_id, device_id, remote_test_id,
                    remote_run_id, status, start_time, created_by, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)",
                params![
                    new.test_config_id,
                    new.environment_id,
                    new.device_id,
                    new.remote_test_id,
                    new.remote_run_id,
                    new.status.as_str(),
                    new.start_time.as_ref().map(ts),
                    new.created_by,
                    now,
                ],
            )?;
            conn.last_insert_rowid()
        };
        self.get_run(id)?.ok_or(StorageError::Missing {
            entity: "test run",
            id: id.to_string(),
        })
    }

    pub fn get_run(&self, id: i64) -> Result<Option<TestRun>, StorageError> {
        let conn = self.pool().get()?;
        let run = conn
            .query_row(
                &format!("SELECT {} FROM test_runs WHERE id = ?1", RUN_COLUMNS),
                params![id],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    /// Runs newest first, optionally filtered by status.
    pub fn list_runs(
        &self,
        status: Option<RunStatus>,
        limit: i64,
    ) -> Result<Vec<TestRun>, StorageError> {
        let conn = self.pool().get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM test_runs
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY id DESC LIMIT ?2",
            RUN_COLUMNS
        ))?;
        let rows = stmt.query_map(params![status.map(|s| s.as_str()), limit], run_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Apply a terminal transition as a compare-and-swap.
    ///
    /// The row only changes if it is still in `transition.from` at
    /// `transition.expected_version`; otherwise `StorageError::Conflict`.
    pub fn transition_run(
        &self,
        run_id: i64,
        transition: &Transition,
    ) -> Result<TestRun, StorageError> {
        {
            let conn = self.pool().get()?;
            let changed = conn.execute(
                "UPDATE test_runs
                 SET status = ?3, end_time = ?4, duration = ?5, failure_reason = ?6,
                     version = version + 1, updated_at = ?7
                 WHERE id = ?1 AND status = ?2 AND version = ?8",
                params![
                    run_id,
                    transition.from.as_str(),
                    transition.to.as_str(),
                    ts(&transition.end_time),
                    transition.duration,
                    transition.failure_reason,
                    ts(&Utc::now()),
                    transition.expected_version,
                ],
            )?;
            if changed == 0 {
                return Err(StorageError::Conflict {
                    run_id,
                    expected_version: transition.expected_version,
                });
            }
        }
        self.get_run(run_id)?.ok_or(StorageError::Missing {
            entity: "test run",
            id: run_id.to_string(),
        })
    }

    // ========================================================================
    // Results
    // ========================================================================

    /// Insert the result for a run, or overwrite the existing one in place.
    pub fn upsert_result(
        &self,
        run_id: i64,
        raw: &Value,
        summary: &ResultSummary,
    ) -> Result<TestResult, StorageError> {
        {
            let conn = self.pool().get()?;
            let now = ts(&Utc::now());
            conn.execute(
                "INSERT INTO test_results (test_run_id, result_json, summary_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(test_run_id) DO UPDATE SET
                    result_json = excluded.result_json,
                    summary_json = excluded.summary_json,
                    updated_at = excluded.updated_at",
                params![
                    run_id,
                    serde_json::to_string(raw)?,
                    serde_json::to_string(summary)?,
                    now,
                ],
            )?;
        }
        self.get_result(run_id)?.ok_or(StorageError::Missing {
            entity: "test result for run",
            id: run_id.to_string(),
        })
    }

    pub fn get_result(&self, run_id: i64) -> Result<Option<TestResult>, StorageError> {
        let conn = self.pool().get()?;
        let result = conn
            .query_row(
                "SELECT id, test_run_id, result_json, summary_json, created_at, updated_at
                 FROM test_results WHERE test_run_id = ?1",
                params![run_id],
                result_from_row,
            )
            .optional()?;
        Ok(result)
    }

    pub fn count_results(&self, run_id: i64) -> Result<i64, StorageError> {
        let conn = self.pool().get()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM test_results WHERE test_run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewDevice, NewEnvironment, NewTestConfiguration};
    use chrono::Duration;
    use serde_json::json;

    fn seeded_run(store: &Store) -> TestRun {
        let config = store
            .insert_configuration(&NewTestConfiguration {
                name: "bw".to_string(),
                description: None,
                test_type: "bandwidth".to_string(),
                payload: json!({}),
                created_by: None,
            })
            .unwrap();
        let env = store
            .insert_environment(&NewEnvironment {
                name: "lab".to_string(),
                description: None,
                ip_address: "10.0.0.5".to_string(),
                port: 443,
                username: "admin".to_string(),
                password: "pw".to_string(),
                attributes: None,
            })
            .unwrap();
        let device = store
            .insert_device(&NewDevice {
                name: "fw".to_string(),
                description: None,
                device_type: "firewall".to_string(),
                ip_address: None,
                credentials: None,
                attributes: None,
            })
            .unwrap();
        store
            .insert_run(&NewTestRun {
                test_config_id: config.id,
                environment_id: env.id,
                device_id: device.id,
                remote_test_id: "t-1".to_string(),
                remote_run_id: "r-1".to_string(),
                status: RunStatus::Running,
                start_time: Some(Utc::now() - Duration::seconds(90)),
                created_by: Some("ops".to_string()),
            })
            .unwrap()
    }

    #[test]
    fn test_insert_run_starts_unfinished() {
        let store = Store::in_memory().unwrap();
        let run = seeded_run(&store);
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.start_time.is_some());
        assert!(run.end_time.is_none());
        assert!(run.duration.is_none());
        assert_eq!(run.version, 0);
    }

    #[test]
    fn test_transition_is_compare_and_swap() {
        let store = Store::in_memory().unwrap();
        let run = seeded_run(&store);

        let t = run.finish(RunStatus::Completed, Utc::now(), None).unwrap();
        let done = store.transition_run(run.id, &t).unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.version, 1);
        assert!(done.duration.unwrap() >= 89);

        // A second writer holding the stale snapshot loses.
        let stale = run.finish(RunStatus::Stopped, Utc::now(), None).unwrap();
        let err = store.transition_run(run.id, &stale).unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
        assert_eq!(store.get_run(run.id).unwrap().unwrap().status, RunStatus::Completed);
    }

    #[test]
    fn test_list_runs_filters_by_status() {
        let store = Store::in_memory().unwrap();
        let run = seeded_run(&store);
        assert_eq!(store.list_runs(Some(RunStatus::Running), 10).unwrap().len(), 1);
        assert!(store.list_runs(Some(RunStatus::Failed), 10).unwrap().is_empty());
        assert_eq!(store.list_runs(None, 10).unwrap()[0].id, run.id);
    }

    #[test]
    fn test_upsert_result_overwrites_in_place() {
        let store = Store::in_memory().unwrap();
        let run = seeded_run(&store);

        let first = json!({"metrics": {"throughput": {"avg": 1}}});
        let second = json!({"metrics": {"throughput": {"avg": 2}}});
        let a = store
            .upsert_result(run.id, &first, &ResultSummary::from_raw(&first))
            .unwrap();
        let b = store
            .upsert_result(run.id, &second, &ResultSummary::from_raw(&second))
            .unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(store.count_results(run.id).unwrap(), 1);
        assert_eq!(b.summary.throughput["avg"], json!(2));
        assert_eq!(b.result_data, second);
    }
}
