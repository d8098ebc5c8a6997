//! Controller client over HTTP/JSON with bearer-token sessions.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{Controller, ControllerError, ControllerSession};
use crate::model::{ReportFormat, ReportType};
use crate::storage::blob::candidate_name;

impl From<reqwest::Error> for ControllerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ControllerError::Api {
                status: e.status().map(|s| s.as_u16()),
                message: format!("malformed response: {}", e),
            }
        } else {
            ControllerError::Connection(e.to_string())
        }
    }
}

/// Turn a non-2xx response into the matching error.
async fn check(resp: Response) -> Result<Response, ControllerError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status.to_string()
    } else {
        body
    };
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ControllerError::Authentication(message),
        StatusCode::NOT_FOUND => ControllerError::NotFound(message),
        other => ControllerError::Api {
            status: Some(other.as_u16()),
            message,
        },
    })
}

/// Last path segment only, so a hostile name cannot escape the scratch dir.
fn safe_file_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches(|c: char| c == '"' || c == '\'');
    let name = trimmed.rsplit(&['/', '\\'][..]).next()?;
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

fn disposition_file_name(resp: &Response) -> Option<String> {
    let header = resp.headers().get(CONTENT_DISPOSITION)?.to_str().ok()?;
    let (_, value) = header.split_once("filename=")?;
    let value = value.split(';').next()?;
    safe_file_name(value)
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Deserialize)]
struct CreatedTest {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartedRun {
    #[serde(default)]
    run_id: Option<String>,
}

#[derive(Deserialize)]
struct RunStatusBody {
    status: String,
}

#[derive(Deserialize)]
struct ChartLink {
    url: String,
}

/// Controller reached at `base_url`, e.g. `https://bps.lab.local`.
pub struct HttpController {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpController {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, ControllerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ControllerError::Connection(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

#[async_trait]
impl Controller for HttpController {
    fn target(&self) -> &str {
        &self.base_url
    }

    async fn login(&self) -> Result<Arc<dyn ControllerSession>, ControllerError> {
        let resp = self
            .client
            .post(format!("{}/api/v1/auth/session", self.base_url))
            .json(&json!({ "username": self.username, "password": self.password }))
            .send()
            .await?;
        let login: LoginResponse = check(resp).await?.json().await?;
        debug!(controller = %self.base_url, "controller session opened");

        Ok(Arc::new(HttpSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: login.token,
        }))
    }
}

/// One bearer-token session.
pub struct HttpSession {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpSession {
    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn run_url(&self, test_id: &str, run_id: &str, leaf: &str) -> String {
        self.url(&format!("/tests/{}/runs/{}/{}", test_id, run_id, leaf))
    }

    /// Absolute URLs pass through; anything else is relative to the controller.
    fn resolve(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else {
            format!("{}/{}", self.base_url, link.trim_start_matches('/'))
        }
    }

    /// Whether `url` points at this controller. Only those requests carry the token.
    fn is_controller_url(&self, url: &str) -> bool {
        url.strip_prefix(self.base_url.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(&['/', '?', '#'][..]))
    }
}

/// First path under `dest` for `name` that no earlier download in this batch took.
fn unclaimed_path(dest: &Path, name: &str, taken: &[PathBuf]) -> PathBuf {
    let mut attempt = 0;
    loop {
        let path = dest.join(candidate_name(name, attempt));
        if !taken.contains(&path) {
            return path;
        }
        attempt += 1;
    }
}

#[async_trait]
impl ControllerSession for HttpSession {
    async fn create_test(&self, payload: &Value) -> Result<String, ControllerError> {
        let resp = self
            .client
            .post(self.url("/tests"))
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await?;
        let created: CreatedTest = check(resp).await?.json().await?;
        Ok(created.id)
    }

    async fn update_test(&self, test_id: &str, payload: &Value) -> Result<(), ControllerError> {
        let resp = self
            .client
            .put(self.url(&format!("/tests/{}", test_id)))
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn delete_test(&self, test_id: &str) -> Result<(), ControllerError> {
        let resp = self
            .client
            .delete(self.url(&format!("/tests/{}", test_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn run_test(&self, test_id: &str) -> Result<Option<String>, ControllerError> {
        let resp = self
            .client
            .post(self.url(&format!("/tests/{}/run", test_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let started: StartedRun = check(resp).await?.json().await?;
        Ok(started.run_id.filter(|id| !id.trim().is_empty()))
    }

    async fn stop_test(&self, test_id: &str) -> Result<(), ControllerError> {
        let resp = self
            .client
            .post(self.url(&format!("/tests/{}/stop", test_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn get_status(&self, test_id: &str, run_id: &str) -> Result<String, ControllerError> {
        let resp = self
            .client
            .get(self.run_url(test_id, run_id, "status"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let body: RunStatusBody = check(resp).await?.json().await?;
        Ok(body.status)
    }

    async fn get_result_summary(
        &self,
        test_id: &str,
        run_id: &str,
    ) -> Result<Value, ControllerError> {
        let resp = self
            .client
            .get(self.run_url(test_id, run_id, "summary"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn generate_report(
        &self,
        test_id: &str,
        run_id: &str,
        format: ReportFormat,
        report_type: ReportType,
        dest: &Path,
    ) -> Result<PathBuf, ControllerError> {
        let resp = self
            .client
            .post(self.run_url(test_id, run_id, "report"))
            .bearer_auth(&self.token)
            .json(&json!({ "reportType": report_type.as_str(), "format": format.as_str() }))
            .send()
            .await?;
        let resp = check(resp).await?;

        let file_name = disposition_file_name(&resp)
            .unwrap_or_else(|| format!("{}-report.{}", report_type, format));
        let data = resp.bytes().await?;

        let path = dest.join(file_name);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| ControllerError::Api {
                status: None,
                message: format!("cannot write report to {}: {}", path.display(), e),
            })?;
        Ok(path)
    }

    async fn generate_charts(
        &self,
        test_id: &str,
        run_id: &str,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, ControllerError> {
        let resp = self
            .client
            .post(self.run_url(test_id, run_id, "charts"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let links: Vec<ChartLink> = check(resp).await?.json().await?;

        let mut written = Vec::with_capacity(links.len());
        for (idx, link) in links.iter().enumerate() {
            let url = self.resolve(&link.url);
            let mut request = self.client.get(&url);
            if self.is_controller_url(&url) {
                request = request.bearer_auth(&self.token);
            }
            let data = check(request.send().await?).await?.bytes().await?;

            let name = link
                .url
                .split(&['?', '#'][..])
                .next()
                .and_then(safe_file_name)
                .unwrap_or_else(|| format!("chart-{}.png", idx + 1));
            let path = unclaimed_path(dest, &name, &written);
            tokio::fs::write(&path, &data)
                .await
                .map_err(|e| ControllerError::Api {
                    status: None,
                    message: format!("cannot write chart to {}: {}", path.display(), e),
                })?;
            written.push(path);
        }
        Ok(written)
    }

    async fn logout(&self) -> Result<(), ControllerError> {
        let resp = self
            .client
            .delete(self.url("/auth/session"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}
