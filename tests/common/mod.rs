//! Scripted in-process controller and a harness wiring it to real storage.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use runconductor::controller::{Controller, ControllerError, ControllerSession};
use runconductor::model::{
    NewDevice, NewEnvironment, NewTestConfiguration, ReportFormat, ReportType, RunStatus, TestRun,
};
use runconductor::orchestrator::{MonitorOutcome, MonitorPolicy, Orchestrator, OrchestratorError};
use runconductor::storage::blob::LocalBlobStore;
use runconductor::storage::Store;

pub const TARGET: &str = "fake://controller";

/// One scripted answer to a status query.
#[derive(Debug, Clone)]
pub enum Step {
    Status(&'static str),
    Fail,
}

#[derive(Default)]
pub struct Counters {
    pub logins: AtomicUsize,
    pub logouts: AtomicUsize,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub runs: AtomicUsize,
    pub stops: AtomicUsize,
    pub status_queries: AtomicUsize,
    pub summaries: AtomicUsize,
    pub reports: AtomicUsize,
    pub charts: AtomicUsize,
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

impl Counters {
    /// Total calls that would have reached the network.
    pub fn network_calls(&self) -> usize {
        [
            &self.logins,
            &self.creates,
            &self.updates,
            &self.deletes,
            &self.runs,
            &self.stops,
            &self.status_queries,
            &self.summaries,
            &self.reports,
            &self.charts,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

/// Behaviour knobs shared by the controller and every session it opens.
pub struct FakeState {
    pub calls: Counters,
    pub script: Mutex<VecDeque<Step>>,
    /// Answer once the script runs dry.
    pub fallback_status: Mutex<&'static str>,
    pub summary: Mutex<Value>,
    pub reject_login: AtomicBool,
    pub update_not_found: AtomicBool,
    pub stop_not_found: AtomicBool,
    pub withhold_run_id: AtomicBool,
    pub fail_summary: AtomicBool,
    next_id: AtomicUsize,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            calls: Counters::default(),
            script: Mutex::new(VecDeque::new()),
            fallback_status: Mutex::new("running"),
            summary: Mutex::new(json!({
                "metrics": {
                    "throughput": { "avg_mbps": 940.5 },
                    "latency": { "avg_us": 120 }
                }
            })),
            reject_login: AtomicBool::new(false),
            update_not_found: AtomicBool::new(false),
            stop_not_found: AtomicBool::new(false),
            withhold_run_id: AtomicBool::new(false),
            fail_summary: AtomicBool::new(false),
            next_id: AtomicUsize::new(1),
        }
    }
}

impl FakeState {
    pub fn script(&self, steps: &[Step]) {
        self.script.lock().unwrap().extend(steps.iter().cloned());
    }

    pub fn settle_as(&self, status: &'static str) {
        *self.fallback_status.lock().unwrap() = status;
    }

    fn next(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

pub struct FakeController {
    pub state: Arc<FakeState>,
}

#[async_trait]
impl Controller for FakeController {
    fn target(&self) -> &str {
        TARGET
    }

    async fn login(&self) -> Result<Arc<dyn ControllerSession>, ControllerError> {
        self.state.calls.logins.fetch_add(1, Ordering::SeqCst);
        if self.state.reject_login.load(Ordering::SeqCst) {
            return Err(ControllerError::Authentication("bad credentials".to_string()));
        }
        Ok(Arc::new(FakeSession {
            state: self.state.clone(),
        }))
    }
}

pub struct FakeSession {
    state: Arc<FakeState>,
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), ControllerError> {
    std::fs::write(path, data).map_err(|e| ControllerError::Api {
        status: None,
        message: e.to_string(),
    })
}

#[async_trait]
impl ControllerSession for FakeSession {
    async fn create_test(&self, _payload: &Value) -> Result<String, ControllerError> {
        self.state.calls.creates.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.next("test"))
    }

    async fn update_test(&self, test_id: &str, _payload: &Value) -> Result<(), ControllerError> {
        self.state.calls.updates.fetch_add(1, Ordering::SeqCst);
        if self.state.update_not_found.load(Ordering::SeqCst) {
            return Err(ControllerError::NotFound(format!("test {}", test_id)));
        }
        Ok(())
    }

    async fn delete_test(&self, _test_id: &str) -> Result<(), ControllerError> {
        self.state.calls.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn run_test(&self, _test_id: &str) -> Result<Option<String>, ControllerError> {
        self.state.calls.runs.fetch_add(1, Ordering::SeqCst);
        if self.state.withhold_run_id.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(self.state.next("run")))
    }

    async fn stop_test(&self, test_id: &str) -> Result<(), ControllerError> {
        self.state.calls.stops.fetch_add(1, Ordering::SeqCst);
        if self.state.stop_not_found.load(Ordering::SeqCst) {
            return Err(ControllerError::NotFound(format!("test {}", test_id)));
        }
        Ok(())
    }

    async fn get_status(&self, _test_id: &str, _run_id: &str) -> Result<String, ControllerError> {
        self.state.calls.status_queries.fetch_add(1, Ordering::SeqCst);
        let step = self.state.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Status(s)) => Ok(s.to_string()),
            Some(Step::Fail) => Err(ControllerError::Connection("connection reset".to_string())),
            None => Ok(self.state.fallback_status.lock().unwrap().to_string()),
        }
    }

    async fn get_result_summary(
        &self,
        _test_id: &str,
        _run_id: &str,
    ) -> Result<Value, ControllerError> {
        self.state.calls.summaries.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_summary.load(Ordering::SeqCst) {
            return Err(ControllerError::Api {
                status: Some(500),
                message: "analyzer unavailable".to_string(),
            });
        }
        Ok(self.state.summary.lock().unwrap().clone())
    }

    async fn generate_report(
        &self,
        _test_id: &str,
        run_id: &str,
        format: ReportFormat,
        report_type: ReportType,
        dest: &Path,
    ) -> Result<PathBuf, ControllerError> {
        self.state.calls.reports.fetch_add(1, Ordering::SeqCst);
        let path = dest.join(format!("{}-report.{}", report_type, format));
        write_file(&path, format!("report for {}", run_id).as_bytes())?;
        Ok(path)
    }

    async fn generate_charts(
        &self,
        _test_id: &str,
        _run_id: &str,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, ControllerError> {
        self.state.calls.charts.fetch_add(1, Ordering::SeqCst);
        let mut written = Vec::new();
        for name in ["throughput.png", "latency.png"] {
            let path = dest.join(name);
            write_file(&path, b"\x89PNG")?;
            written.push(path);
        }
        Ok(written)
    }

    async fn logout(&self) -> Result<(), ControllerError> {
        self.state.calls.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Millisecond-scale polling so monitor scenarios finish quickly.
pub fn fast_policy() -> MonitorPolicy {
    MonitorPolicy {
        poll_interval: Duration::from_millis(5),
        error_backoff: Duration::from_millis(1),
        max_consecutive_errors: Some(50),
        max_duration: None,
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub state: Arc<FakeState>,
    pub blobs: LocalBlobStore,
    pub config_id: i64,
    pub environment_id: i64,
    pub device_id: i64,
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(fast_policy())
    }

    pub fn with_policy(policy: MonitorPolicy) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("runs.db").to_string_lossy()).unwrap();
        let blobs = LocalBlobStore::new(dir.path().join("blobs"));
        let state = Arc::new(FakeState::default());

        let config = store
            .insert_configuration(&NewTestConfiguration {
                name: "Edge Strikes".to_string(),
                description: None,
                test_type: "strike".to_string(),
                payload: json!({ "strikeList": "all", "duration": 300 }),
                created_by: Some("ops".to_string()),
            })
            .unwrap();
        let env = store
            .insert_environment(&NewEnvironment {
                name: "lab-a".to_string(),
                description: None,
                ip_address: "10.0.0.5".to_string(),
                port: 443,
                username: "admin".to_string(),
                password: "secret".to_string(),
                attributes: None,
            })
            .unwrap();
        let device = store
            .insert_device(&NewDevice {
                name: "fw-01".to_string(),
                description: None,
                device_type: "firewall".to_string(),
                ip_address: Some("10.0.1.1".to_string()),
                credentials: None,
                attributes: None,
            })
            .unwrap();

        let orchestrator = Orchestrator::new(
            store,
            Arc::new(FakeController {
                state: state.clone(),
            }),
            Arc::new(blobs.clone()),
            policy,
        );

        Self {
            orchestrator,
            state,
            blobs,
            config_id: config.id,
            environment_id: env.id,
            device_id: device.id,
            _dir: dir,
        }
    }

    pub async fn launch(&self) -> TestRun {
        self.orchestrator
            .launch(self.config_id, self.environment_id, self.device_id, Some("ops"))
            .await
            .unwrap()
    }

    pub async fn launch_err(&self) -> OrchestratorError {
        self.orchestrator
            .launch(self.config_id, self.environment_id, self.device_id, Some("ops"))
            .await
            .unwrap_err()
    }

    /// Launch a run and let its monitor settle it as `completed`.
    pub async fn completed_run(&self) -> TestRun {
        self.state.settle_as("completed");
        let run = self.launch().await;
        let outcome = self.orchestrator.monitors().join(run.id).await;
        assert_eq!(outcome, Some(MonitorOutcome::Settled(RunStatus::Completed)));
        self.orchestrator.load_run(run.id).unwrap()
    }

    pub fn calls(&self) -> &Counters {
        &self.state.calls
    }
}
