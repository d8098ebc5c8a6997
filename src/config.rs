//! TOML configuration for the run conductor daemon and CLI.
//!
//! Every section has compiled-in defaults; a file only needs the keys it
//! changes. The controller password can come from the environment instead
//! of the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::orchestrator::MonitorPolicy;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "RUNCONDUCTOR_CONFIG";
/// Environment variable overriding `controller.password`.
pub const PASSWORD_ENV: &str = "RUNCONDUCTOR_CONTROLLER_PASSWORD";
/// Config file looked up in the working directory.
pub const LOCAL_CONFIG: &str = "runconductor.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConductorConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// File the configuration was read from; `None` for compiled-in defaults.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl ConductorConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Resolve configuration from, in order:
    /// 1. `explicit` (the `--config` flag); failing to load it is an error.
    /// 2. The path in `RUNCONDUCTOR_CONFIG`.
    /// 3. `./runconductor.toml`.
    /// 4. Compiled-in defaults.
    ///
    /// `RUNCONDUCTOR_CONTROLLER_PASSWORD` then overrides the password.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(),
        };
        Ok(config.with_password_override(std::env::var(PASSWORD_ENV).ok()))
    }

    /// Like [`resolve`](Self::resolve) without an explicit path, never failing.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "RUNCONDUCTOR_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    fn with_password_override(mut self, password: Option<String>) -> Self {
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.controller.password = password;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Remote test controller connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Base URL, e.g. `https://bps.lab.local`.
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout (seconds).
    pub request_timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            username: "admin".to_string(),
            password: String::new(),
            request_timeout_secs: 30,
        }
    }
}

impl ControllerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Record database and artifact blob locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Root directory for stored reports and charts.
    pub blob_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("runconductor.db"),
            blob_root: PathBuf::from("artifacts"),
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Run monitor polling behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Pause between successful status polls (seconds).
    pub poll_interval_secs: u64,
    /// Pause after a failed status poll (seconds).
    pub error_backoff_secs: u64,
    /// Failed polls in a row before a run is forced to failed. 0 disables.
    pub max_consecutive_errors: u32,
    /// Longest a run may stay active before it is forced to failed. 0 disables.
    pub max_run_duration_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            error_backoff_secs: 5,
            max_consecutive_errors: 120,
            max_run_duration_secs: 86_400,
        }
    }
}

impl MonitorConfig {
    pub fn policy(&self) -> MonitorPolicy {
        MonitorPolicy {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            max_consecutive_errors: (self.max_consecutive_errors > 0)
                .then_some(self.max_consecutive_errors),
            max_duration: (self.max_run_duration_secs > 0)
                .then(|| Duration::from_secs(self.max_run_duration_secs)),
        }
    }
}

// ---------------------------------------------------------------------------
// API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address the HTTP API listens on.
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7400".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
