//! Report and chart generation relayed from the controller into blob storage.

use std::collections::HashSet;
use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{with_session, Orchestrator, OrchestratorError};
use crate::model::{Media, NewMedia, NewReport, Report, ReportFormat, ReportType, TestRun};
use crate::storage::blob::{candidate_name, content_type_for};
use crate::storage::StorageError;

/// Attempts at finding a free `{stem}-{n}.{ext}` name before giving up.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Caller input for a report. Type and format arrive as strings and are
/// validated before anything else happens.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportRequest {
    #[serde(default = "default_report_type")]
    pub report_type: String,
    #[serde(default = "default_format")]
    pub format: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<String>,
}

fn default_report_type() -> String {
    ReportType::Standard.as_str().to_string()
}

fn default_format() -> String {
    ReportFormat::Pdf.as_str().to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedReport {
    pub report: Report,
    pub stored_path: String,
    pub filename: String,
}

fn require_settled(run: &TestRun) -> Result<(), OrchestratorError> {
    if run.status.is_terminal() {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidState {
            run_id: run.id,
            expected: "completed, failed or stopped",
            actual: run.status,
        })
    }
}

fn file_name_of(path: &Path) -> Result<String, OrchestratorError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            OrchestratorError::Api(format!(
                "controller produced an unnamed file at {}",
                path.display()
            ))
        })
}

impl Orchestrator {
    /// Render a report for a settled run and store it under `reports/{run_id}/`.
    pub async fn generate_report(
        &self,
        run_id: i64,
        request: &ReportRequest,
    ) -> Result<GeneratedReport, OrchestratorError> {
        let report_type: ReportType = request
            .report_type
            .parse()
            .map_err(OrchestratorError::Validation)?;
        let format: ReportFormat = request.format.parse().map_err(OrchestratorError::Validation)?;

        let run = self.load_run(run_id)?;
        require_settled(&run)?;
        let config = self.load_configuration(run.test_config_id)?;

        let scratch = tempfile::Builder::new()
            .prefix("runconductor-report-")
            .tempdir()
            .map_err(StorageError::from)?;
        let dest = scratch.path().to_path_buf();

        let (test_id, remote_run_id) = (run.remote_test_id.clone(), run.remote_run_id.clone());
        let rendered = with_session(self.controller.as_ref(), |session| async move {
            Ok(session
                .generate_report(&test_id, &remote_run_id, format, report_type, &dest)
                .await?)
        })
        .await?;

        let data = tokio::fs::read(&rendered).await.map_err(StorageError::from)?;
        let stored_path = self
            .save_unique(&format!("reports/{}", run_id), &file_name_of(&rendered)?, data.into())
            .await?;
        drop(scratch);

        let filename = stored_path
            .rsplit('/')
            .next()
            .unwrap_or(stored_path.as_str())
            .to_string();
        let report = self.store.insert_report(&NewReport {
            test_run_id: run_id,
            name: request
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("{} - {} Report", config.name, report_type.title())),
            description: request.description.clone(),
            report_type,
            file_format: format,
            file_path: stored_path.clone(),
            created_by: request.created_by.clone(),
        })?;
        info!(run_id, report_id = report.id, path = %stored_path, "report stored");

        Ok(GeneratedReport {
            report,
            stored_path,
            filename,
        })
    }

    /// Render the chart set for a settled run and store each chart under
    /// `charts/{run_id}/` with a media record.
    pub async fn generate_charts(
        &self,
        run_id: i64,
        created_by: Option<&str>,
    ) -> Result<Vec<Media>, OrchestratorError> {
        let run = self.load_run(run_id)?;
        require_settled(&run)?;

        let scratch = tempfile::Builder::new()
            .prefix("runconductor-charts-")
            .tempdir()
            .map_err(StorageError::from)?;
        let dest = scratch.path().to_path_buf();

        let (test_id, remote_run_id) = (run.remote_test_id.clone(), run.remote_run_id.clone());
        let rendered = with_session(self.controller.as_ref(), |session| async move {
            Ok(session
                .generate_charts(&test_id, &remote_run_id, &dest)
                .await?)
        })
        .await?;

        let mut media = Vec::with_capacity(rendered.len());
        for path in &rendered {
            let name = file_name_of(path)?;
            let data = tokio::fs::read(path).await.map_err(StorageError::from)?;
            let stored_path = self
                .save_unique(&format!("charts/{}", run_id), &name, data.into())
                .await?;

            media.push(self.store.insert_media(&NewMedia {
                test_run_id: run_id,
                name,
                description: Some(format!("Chart for run {}", run_id)),
                media_type: "chart".to_string(),
                content_type: content_type_for(&stored_path),
                file_path: stored_path,
                created_by: created_by.map(str::to_string),
            })?);
        }
        drop(scratch);

        info!(run_id, count = media.len(), "charts stored");
        Ok(media)
    }

    /// Save under `dir`, suffixing the name until it does not collide.
    async fn save_unique(
        &self,
        dir: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<String, OrchestratorError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = format!("{}/{}", dir, candidate_name(file_name, attempt));
            if self.blobs.exists(&path).await? {
                continue;
            }
            match self.blobs.save(data.clone(), &path).await {
                Ok(stored) => return Ok(stored),
                Err(StorageError::AlreadyExists(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::AlreadyExists(format!("{}/{}", dir, file_name)).into())
    }

    pub fn reports_for_run(&self, run_id: i64) -> Result<Vec<Report>, OrchestratorError> {
        self.load_run(run_id)?;
        Ok(self.store.list_reports(run_id)?)
    }

    pub fn media_for_run(&self, run_id: i64) -> Result<Vec<Media>, OrchestratorError> {
        self.load_run(run_id)?;
        Ok(self.store.list_media(run_id)?)
    }

    /// Delete blobs that no report or media record points at. Returns the
    /// deleted paths; individual deletion failures are logged and skipped.
    pub async fn sweep_orphans(&self) -> Result<Vec<String>, OrchestratorError> {
        let referenced: HashSet<String> = self.store.referenced_paths()?.into_iter().collect();

        let mut deleted = Vec::new();
        for path in self.blobs.list("").await? {
            if referenced.contains(&path) {
                continue;
            }
            match self.blobs.delete(&path).await {
                Ok(true) => deleted.push(path),
                Ok(false) => {}
                Err(e) => warn!(path = %path, error = %e, "cannot delete orphaned blob"),
            }
        }

        if !deleted.is_empty() {
            info!(count = deleted.len(), "orphaned blobs deleted");
        }
        Ok(deleted)
    }
}
