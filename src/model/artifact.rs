//! Generated artifacts: reports and chart media.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of report the controller renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Standard,
    Executive,
    Detailed,
    Compliance,
}

impl ReportType {
    pub const ALL: [ReportType; 4] = [
        ReportType::Standard,
        ReportType::Executive,
        ReportType::Detailed,
        ReportType::Compliance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Standard => "standard",
            ReportType::Executive => "executive",
            ReportType::Detailed => "detailed",
            ReportType::Compliance => "compliance",
        }
    }

    /// Capitalized form used in default report names.
    pub fn title(&self) -> &'static str {
        match self {
            ReportType::Standard => "Standard",
            ReportType::Executive => "Executive",
            ReportType::Detailed => "Detailed",
            ReportType::Compliance => "Compliance",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "invalid report type '{}'; must be one of: standard, executive, detailed, compliance",
                    s
                )
            })
    }
}

/// File format of a rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Html,
    Pdf,
    Csv,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 3] = [ReportFormat::Html, ReportFormat::Pdf, ReportFormat::Csv];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Pdf => "pdf",
            ReportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("invalid file format '{}'; must be one of: html, pdf, csv", s))
    }
}

/// A stored report file for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub test_run_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub report_type: ReportType,
    pub file_format: ReportFormat,
    pub file_path: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub test_run_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub report_type: ReportType,
    pub file_format: ReportFormat,
    pub file_path: String,
    pub created_by: Option<String>,
}

/// A stored media file (charts, captures) for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: i64,
    pub test_run_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub media_type: String,
    pub content_type: String,
    pub file_path: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMedia {
    pub test_run_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub media_type: String,
    pub content_type: String,
    pub file_path: String,
    pub created_by: Option<String>,
}
