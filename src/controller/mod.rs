//! Remote test controller: session traits, error taxonomy and status mapping.

pub mod http;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::model::{ReportFormat, ReportType, RunStatus};

pub use self::http::HttpController;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("controller rejected credentials: {0}")]
    Authentication(String),

    #[error("not found on controller: {0}")]
    NotFound(String),

    #[error("controller API error: {message}")]
    Api { status: Option<u16>, message: String },

    #[error("cannot reach controller: {0}")]
    Connection(String),

    #[error("controller reported unrecognized status '{0}'")]
    UnexpectedStatus(String),
}

impl ControllerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControllerError::NotFound(_))
    }
}

/// Opens authenticated sessions against one controller.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Identity of the controller (its base URL), used to scope cached remote ids.
    fn target(&self) -> &str;

    async fn login(&self) -> Result<Arc<dyn ControllerSession>, ControllerError>;
}

/// Calls available inside one authenticated session.
#[async_trait]
pub trait ControllerSession: Send + Sync {
    /// Create a remote test from a configuration payload; returns its id.
    async fn create_test(&self, payload: &Value) -> Result<String, ControllerError>;

    async fn update_test(&self, test_id: &str, payload: &Value) -> Result<(), ControllerError>;

    async fn delete_test(&self, test_id: &str) -> Result<(), ControllerError>;

    /// Start a run. `None` (or an empty id) means the controller accepted the
    /// call without handing back a usable run id.
    async fn run_test(&self, test_id: &str) -> Result<Option<String>, ControllerError>;

    async fn stop_test(&self, test_id: &str) -> Result<(), ControllerError>;

    /// Raw status string of a run as the controller spells it.
    async fn get_status(&self, test_id: &str, run_id: &str) -> Result<String, ControllerError>;

    async fn get_result_summary(&self, test_id: &str, run_id: &str)
        -> Result<Value, ControllerError>;

    /// Render a report into `dest`, returning the written file.
    async fn generate_report(
        &self,
        test_id: &str,
        run_id: &str,
        format: ReportFormat,
        report_type: ReportType,
        dest: &Path,
    ) -> Result<PathBuf, ControllerError>;

    /// Render the chart set into `dest`, returning the written files.
    async fn generate_charts(
        &self,
        test_id: &str,
        run_id: &str,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, ControllerError>;

    async fn logout(&self) -> Result<(), ControllerError>;
}

/// Map a controller status string onto the local status vocabulary.
///
/// Anything unrecognized is an error rather than a guess.
pub fn map_remote_status(raw: &str) -> Result<RunStatus, ControllerError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pending" | "queued" | "scheduled" => Ok(RunStatus::Pending),
        "running" | "starting" | "initializing" | "in_progress" | "stopping" => {
            Ok(RunStatus::Running)
        }
        "completed" | "complete" | "finished" | "passed" => Ok(RunStatus::Completed),
        "failed" | "error" | "aborted" => Ok(RunStatus::Failed),
        "stopped" | "cancelled" | "canceled" => Ok(RunStatus::Stopped),
        _ => Err(ControllerError::UnexpectedStatus(raw.to_string())),
    }
}
