//! Report and chart generation, relayed into blob storage.

mod common;

use bytes::Bytes;

use common::{count, Harness};
use runconductor::model::{ReportFormat, ReportType, RunStatus};
use runconductor::orchestrator::{OrchestratorError, ReportRequest};
use runconductor::storage::blob::BlobStore;

fn request(report_type: &str, format: &str) -> ReportRequest {
    ReportRequest {
        report_type: report_type.to_string(),
        format: format.to_string(),
        name: None,
        description: None,
        created_by: Some("ops".to_string()),
    }
}

#[tokio::test]
async fn test_bogus_report_type_fails_before_any_call() {
    let h = Harness::new();
    let run = h.completed_run().await;
    let calls_before = h.calls().network_calls();

    let err = h
        .orchestrator
        .generate_report(run.id, &request("bogus", "pdf"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(ref msg) if msg.contains("bogus")));

    let err = h
        .orchestrator
        .generate_report(run.id, &request("standard", "docx"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));

    assert_eq!(h.calls().network_calls(), calls_before);
    assert!(h.blobs.list("").await.unwrap().is_empty());
    assert!(h.orchestrator.reports_for_run(run.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_bogus_type_rejected_even_for_unknown_run() {
    let h = Harness::new();
    let err = h
        .orchestrator
        .generate_report(4242, &request("bogus", "pdf"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));
}

#[tokio::test]
async fn test_report_requires_settled_run() {
    let h = Harness::new();
    let run = h.launch().await;

    let err = h
        .orchestrator
        .generate_report(run.id, &request("standard", "pdf"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InvalidState { actual: RunStatus::Running, .. }
    ));
    let err = h.orchestrator.generate_charts(run.id, None).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidState { .. }));

    assert_eq!(count(&h.calls().reports), 0);
    assert_eq!(count(&h.calls().charts), 0);
}

#[tokio::test]
async fn test_report_is_stored_and_recorded() {
    let h = Harness::new();
    let run = h.completed_run().await;

    let generated = h
        .orchestrator
        .generate_report(run.id, &request("executive", "html"))
        .await
        .unwrap();

    assert_eq!(
        generated.stored_path,
        format!("reports/{}/executive-report.html", run.id)
    );
    assert_eq!(generated.filename, "executive-report.html");
    assert_eq!(generated.report.name, "Edge Strikes - Executive Report");
    assert_eq!(generated.report.report_type, ReportType::Executive);
    assert_eq!(generated.report.file_format, ReportFormat::Html);
    assert_eq!(generated.report.file_path, generated.stored_path);

    let (data, content_type) = h.blobs.get(&generated.stored_path).await.unwrap();
    assert_eq!(&data[..], format!("report for {}", run.remote_run_id).as_bytes());
    assert_eq!(content_type, "text/html");

    let reports = h.orchestrator.reports_for_run(run.id).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].id, generated.report.id);
}

#[tokio::test]
async fn test_repeated_report_gets_fresh_path() {
    let h = Harness::new();
    let run = h.completed_run().await;

    let first = h
        .orchestrator
        .generate_report(run.id, &request("standard", "pdf"))
        .await
        .unwrap();
    let mut named = request("standard", "pdf");
    named.name = Some("Quarterly audit".to_string());
    let second = h.orchestrator.generate_report(run.id, &named).await.unwrap();

    assert_eq!(first.filename, "standard-report.pdf");
    assert_eq!(second.filename, "standard-report-1.pdf");
    assert_eq!(second.report.name, "Quarterly audit");
    assert_eq!(h.orchestrator.reports_for_run(run.id).unwrap().len(), 2);
}

#[tokio::test]
async fn test_stopped_runs_are_eligible() {
    let h = Harness::new();
    let run = h.launch().await;
    h.orchestrator.stop(run.id).await.unwrap();

    let generated = h
        .orchestrator
        .generate_report(run.id, &request("compliance", "csv"))
        .await
        .unwrap();
    assert_eq!(generated.filename, "compliance-report.csv");
}

#[tokio::test]
async fn test_charts_become_media_records() {
    let h = Harness::new();
    let run = h.completed_run().await;

    let media = h.orchestrator.generate_charts(run.id, Some("ops")).await.unwrap();
    assert_eq!(media.len(), 2);
    for item in &media {
        assert_eq!(item.media_type, "chart");
        assert_eq!(item.content_type, "image/png");
        assert!(item.file_path.starts_with(&format!("charts/{}/", run.id)));
        assert!(h.blobs.exists(&item.file_path).await.unwrap());
    }
    assert_eq!(h.orchestrator.media_for_run(run.id).unwrap().len(), 2);
    assert_eq!(count(&h.calls().charts), 1);
}

#[tokio::test]
async fn test_sweep_deletes_only_unreferenced_blobs() {
    let h = Harness::new();
    let run = h.completed_run().await;
    let report = h
        .orchestrator
        .generate_report(run.id, &request("standard", "pdf"))
        .await
        .unwrap();
    let charts = h.orchestrator.generate_charts(run.id, None).await.unwrap();

    h.blobs
        .save(Bytes::from_static(b"stray"), "reports/999/abandoned.pdf")
        .await
        .unwrap();

    let deleted = h.orchestrator.sweep_orphans().await.unwrap();
    assert_eq!(deleted, vec!["reports/999/abandoned.pdf".to_string()]);

    assert!(h.blobs.exists(&report.stored_path).await.unwrap());
    for chart in &charts {
        assert!(h.blobs.exists(&chart.file_path).await.unwrap());
    }
    assert!(h.orchestrator.sweep_orphans().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_artifact_listing_for_unknown_run() {
    let h = Harness::new();
    let err = h.orchestrator.reports_for_run(77).unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound { entity: "test run", .. }));
}
