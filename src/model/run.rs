//! Test run records and the run status state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a test run.
///
/// `pending -> running -> {completed, failed, stopped}`. The last three are
/// terminal: nothing leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Stopped
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        match self {
            RunStatus::Pending => next == RunStatus::Running,
            RunStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown run status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for RunStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "stopped" => Ok(RunStatus::Stopped),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// One execution of a test configuration on the remote controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub id: i64,
    pub test_config_id: i64,
    pub environment_id: i64,
    pub device_id: i64,
    pub remote_test_id: String,
    pub remote_run_id: String,
    pub status: RunStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Whole seconds between `start_time` and `end_time`; set only at a terminal transition.
    pub duration: Option<i64>,
    /// Why the run was forced into a terminal state, when it was not the controller's verdict.
    pub failure_reason: Option<String>,
    pub created_by: Option<String>,
    /// Optimistic concurrency token, bumped on every transition.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a run about to be inserted.
#[derive(Debug, Clone)]
pub struct NewTestRun {
    pub test_config_id: i64,
    pub environment_id: i64,
    pub device_id: i64,
    pub remote_test_id: String,
    pub remote_run_id: String,
    pub status: RunStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
}

/// A terminal transition computed from a run and the moment it ended.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: RunStatus,
    pub to: RunStatus,
    pub expected_version: i64,
    pub end_time: DateTime<Utc>,
    pub duration: Option<i64>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("run {run_id} cannot move from {from} to {to}")]
pub struct IllegalTransition {
    pub run_id: i64,
    pub from: RunStatus,
    pub to: RunStatus,
}

impl TestRun {
    /// Compute the terminal transition for this run ending at `at`.
    ///
    /// `duration` is `floor(at - start_time)` in seconds, clamped at zero when
    /// the clock went backwards or the run never recorded a start. It is always
    /// set alongside `end_time`.
    pub fn finish(
        &self,
        to: RunStatus,
        at: DateTime<Utc>,
        failure_reason: Option<String>,
    ) -> Result<Transition, IllegalTransition> {
        if !to.is_terminal() || !self.status.can_transition_to(to) {
            return Err(IllegalTransition {
                run_id: self.id,
                from: self.status,
                to,
            });
        }

        let duration = self
            .start_time
            .map_or(0, |start| (at - start).num_seconds().max(0));

        Ok(Transition {
            from: self.status,
            to,
            expected_version: self.version,
            end_time: at,
            duration: Some(duration),
            failure_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn running_run(start: DateTime<Utc>) -> TestRun {
        TestRun {
            id: 7,
            test_config_id: 1,
            environment_id: 1,
            device_id: 1,
            remote_test_id: "t-1".to_string(),
            remote_run_id: "r-1".to_string(),
            status: RunStatus::Running,
            start_time: Some(start),
            end_time: None,
            duration: None,
            failure_reason: None,
            created_by: None,
            version: 3,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_terminal_states_are_sinks() {
        for from in [RunStatus::Completed, RunStatus::Failed, RunStatus::Stopped] {
            for to in [
                RunStatus::Pending,
                RunStatus::Running,
                RunStatus::Completed,
                RunStatus::Failed,
                RunStatus::Stopped,
            ] {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn test_forward_edges_only() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Pending.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Failed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Stopped));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Pending));
    }

    #[test]
    fn test_finish_truncates_duration_to_whole_seconds() {
        let start = Utc::now();
        let run = running_run(start);
        let end = start + Duration::milliseconds(12_999);

        let t = run.finish(RunStatus::Completed, end, None).unwrap();
        assert_eq!(t.duration, Some(12));
        assert_eq!(t.end_time, end);
        assert_eq!(t.expected_version, 3);
        assert_eq!(t.from, RunStatus::Running);
    }

    #[test]
    fn test_finish_without_start_still_records_duration() {
        let mut run = running_run(Utc::now());
        run.start_time = None;
        let t = run.finish(RunStatus::Failed, Utc::now(), None).unwrap();
        assert_eq!(t.duration, Some(0));
    }

    #[test]
    fn test_finish_rejects_non_terminal_target() {
        let run = running_run(Utc::now());
        let err = run.finish(RunStatus::Pending, Utc::now(), None).unwrap_err();
        assert_eq!(err.to, RunStatus::Pending);
    }

    #[test]
    fn test_finish_rejects_second_terminal_state() {
        let mut run = running_run(Utc::now());
        run.status = RunStatus::Completed;
        assert!(run.finish(RunStatus::Failed, Utc::now(), None).is_err());
    }

    #[test]
    fn test_status_round_trips_through_text() {
        assert_eq!("stopped".parse::<RunStatus>().unwrap(), RunStatus::Stopped);
        assert!("unknown".parse::<RunStatus>().is_err());
        assert_eq!(RunStatus::Failed.to_string(), "failed");
    }
}
