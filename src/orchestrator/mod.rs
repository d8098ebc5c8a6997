//! Run lifecycle orchestration: definition sync, launch, monitoring, result
//! ingestion and artifact generation against one remote controller.

pub mod artifacts;
pub mod ingest;
pub mod launch;
pub mod monitor;
pub mod session;
pub mod sync;

use std::sync::Arc;

use thiserror::Error;

use crate::controller::{Controller, ControllerError};
use crate::model::{RunStatus, TestConfiguration, TestRun};
use crate::storage::blob::BlobStore;
use crate::storage::{StorageError, Store};

pub use self::artifacts::{GeneratedReport, ReportRequest};
pub use self::monitor::{MonitorOutcome, MonitorPolicy, MonitorRegistry};
pub use self::session::with_session;

/// Failures surfaced to callers of launch, stop, sync and artifact operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("launch failed: {0}")]
    Launch(String),

    #[error("run {run_id} is {actual}, expected {expected}")]
    InvalidState {
        run_id: i64,
        expected: &'static str,
        actual: RunStatus,
    },

    #[error("controller API error: {0}")]
    Api(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<ControllerError> for OrchestratorError {
    fn from(e: ControllerError) -> Self {
        match e {
            ControllerError::Authentication(msg) => OrchestratorError::Authentication(msg),
            ControllerError::NotFound(msg) => OrchestratorError::NotFound {
                entity: "remote object",
                id: msg,
            },
            ControllerError::Api {
                status: Some(code),
                message,
            } => OrchestratorError::Api(format!("HTTP {}: {}", code, message)),
            ControllerError::Api {
                status: None,
                message,
            } => OrchestratorError::Api(message),
            ControllerError::Connection(msg) => OrchestratorError::Connection(msg),
            e @ ControllerError::UnexpectedStatus(_) => OrchestratorError::Api(e.to_string()),
        }
    }
}

/// Shared handle over the record store, blob store and controller.
///
/// Cheap to clone; every monitor task holds its own clone.
#[derive(Clone)]
pub struct Orchestrator {
    store: Store,
    controller: Arc<dyn Controller>,
    blobs: Arc<dyn BlobStore>,
    policy: MonitorPolicy,
    monitors: Arc<MonitorRegistry>,
}

impl Orchestrator {
    pub fn new(
        store: Store,
        controller: Arc<dyn Controller>,
        blobs: Arc<dyn BlobStore>,
        policy: MonitorPolicy,
    ) -> Self {
        Self {
            store,
            controller,
            blobs,
            policy,
            monitors: Arc::new(MonitorRegistry::default()),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn policy(&self) -> &MonitorPolicy {
        &self.policy
    }

    pub fn monitors(&self) -> &MonitorRegistry {
        &self.monitors
    }

    pub fn load_run(&self, run_id: i64) -> Result<TestRun, OrchestratorError> {
        self.store
            .get_run(run_id)?
            .ok_or_else(|| OrchestratorError::NotFound {
                entity: "test run",
                id: run_id.to_string(),
            })
    }

    pub fn load_configuration(&self, config_id: i64) -> Result<TestConfiguration, OrchestratorError> {
        self.store
            .get_configuration(config_id)?
            .ok_or_else(|| OrchestratorError::NotFound {
                entity: "test configuration",
                id: config_id.to_string(),
            })
    }
}
