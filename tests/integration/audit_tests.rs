//! End-to-end audits against mock sites
//!
//! Each test serves a small site with wiremock, runs a full job through the
//! service and checks the stored report.

use crate::common::*;
use pdf_audit::report::FindingOutcome;
use pdf_audit::storage::{JobStore, SqliteJobStore};
use pdf_audit::{AuditOptions, FacadeError, JobState, ValidationStatus};
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_depth_limit_counts_pdfs_on_reachable_pages() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/a.pdf", "/level1"]).await;
    mount_page(&server, "/level1", &["/b.pdf", "/level2"]).await;
    // one level too deep: never fetched
    mount_page_expect(&server, "/level2", &["/c.pdf"], 0).await;
    mount_pdf(&server, "/a.pdf", &pdf_bytes("a")).await;
    mount_pdf(&server, "/b.pdf", &pdf_bytes("b")).await;
    mount_pdf(&server, "/c.pdf", &pdf_bytes("c")).await;

    let dir = tempfile::tempdir().unwrap();
    let service = open_service(create_test_config(dir.path(), PASS_SCRIPT));
    let options = AuditOptions {
        max_depth: 1,
        ..service.default_options()
    };

    let id = service.start_audit(&server.uri(), options).unwrap();
    let job = wait_for(&service, id).await;
    assert_eq!(job.state, JobState::Complete, "{:?}", job.failure_reason);

    let report = service.get_report(id).unwrap();
    assert_eq!(report.total_files, 2);
    assert_eq!(report.pass_count, 2);
    assert_eq!(job.progress.pages_crawled, 2);
    assert_eq!(job.progress.files_found, 2);
    assert_eq!(job.progress.files_validated, 2);
    assert_eq!(request_count(&server, "/c.pdf").await, 0);
}

#[tokio::test]
async fn test_page_limit_caps_fetches() {
    let server = MockServer::start().await;
    let pages: Vec<String> = (0..10).map(|i| format!("/page{}", i)).collect();
    let hrefs: Vec<&str> = pages.iter().map(String::as_str).collect();
    mount_page(&server, "/", &hrefs).await;
    for page in &pages {
        mount_page(&server, page, &[]).await;
    }

    let dir = tempfile::tempdir().unwrap();
    let service = open_service(create_test_config(dir.path(), PASS_SCRIPT));
    let options = AuditOptions {
        max_pages: 3,
        ..service.default_options()
    };

    let id = service.start_audit(&server.uri(), options).unwrap();
    let job = wait_for(&service, id).await;
    assert_eq!(job.state, JobState::Complete);

    let page_requests = server
        .received_requests()
        .await
        .unwrap_or_default()
        .len();
    assert!(page_requests <= 3, "made {} page requests", page_requests);
    assert_eq!(job.progress.pages_crawled, 3);
    assert_eq!(service.get_report(id).unwrap().total_files, 0);
}

#[tokio::test]
async fn test_shared_links_fetched_once() {
    let server = MockServer::start().await;
    mount_page_expect(&server, "/", &["/left", "/right"], 1).await;
    mount_page_expect(&server, "/left", &["/shared", "/right", "/doc.pdf"], 1).await;
    mount_page_expect(&server, "/right", &["/shared", "/left", "/doc.pdf#page=2"], 1).await;
    mount_page_expect(&server, "/shared", &["/", "/doc.pdf"], 1).await;
    Mock::given(method("GET"))
        .and(path("/doc.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_bytes("doc"), "application/pdf"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = open_service(create_test_config(dir.path(), PASS_SCRIPT));

    let id = service
        .start_audit(&server.uri(), service.default_options())
        .unwrap();
    let job = wait_for(&service, id).await;
    assert_eq!(job.state, JobState::Complete);
    assert_eq!(service.get_report(id).unwrap().total_files, 1);
    // expectations are verified when the server is dropped
}

#[tokio::test]
async fn test_identical_content_validated_once() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/2023/report.pdf", "/archive/report-copy.pdf"]).await;
    let body = pdf_bytes("annual report");
    mount_pdf(&server, "/2023/report.pdf", &body).await;
    mount_pdf(&server, "/archive/report-copy.pdf", &body).await;

    let dir = tempfile::tempdir().unwrap();
    let service = open_service(create_test_config(dir.path(), PASS_SCRIPT));

    let id = service
        .start_audit(&server.uri(), service.default_options())
        .unwrap();
    let job = wait_for(&service, id).await;
    assert_eq!(job.state, JobState::Complete);

    let report = service.get_report(id).unwrap();
    assert_eq!(report.total_files, 1);
    assert_eq!(report.results.len(), 1);
    assert_eq!(service.validator_invocations(), 1);

    // whichever URL finished downloading first owns the resource; the other is its alias
    let result = &report.results[0];
    assert!(result.resource_ref.starts_with("sha256:"));
    let aliases = report.aliases_of(&result.resource_ref);
    assert_eq!(aliases.len(), 1);
    let mut urls = vec![result.source_url.clone(), aliases[0].clone()];
    urls.sort();
    assert_eq!(
        urls,
        vec![
            format!("{}/2023/report.pdf", server.uri()),
            format!("{}/archive/report-copy.pdf", server.uri()),
        ]
    );
    assert_eq!(job.progress.files_validated, 2);
}

#[tokio::test]
async fn test_oversize_file_is_error_without_validation() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/huge.pdf"]).await;
    mount_pdf(&server, "/huge.pdf", &vec![b'x'; 4096]).await;

    let dir = tempfile::tempdir().unwrap();
    let service = open_service(create_test_config(dir.path(), PASS_SCRIPT));
    let options = AuditOptions {
        max_file_size: 1024,
        ..service.default_options()
    };

    let id = service.start_audit(&server.uri(), options).unwrap();
    let job = wait_for(&service, id).await;
    assert_eq!(job.state, JobState::Complete);

    let report = service.get_report(id).unwrap();
    assert_eq!(report.total_files, 1);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.results[0].status, ValidationStatus::Error);
    let message = report.results[0].message.as_deref().unwrap_or_default();
    assert!(message.contains("size limit"), "unexpected message: {}", message);
    assert_eq!(service.validator_invocations(), 0);
}

#[tokio::test]
async fn test_fail_verdict_keeps_findings_in_order() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/untagged.pdf"]).await;
    mount_pdf(&server, "/untagged.pdf", &pdf_bytes("untagged")).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path(), FAIL_SCRIPT);
    config.validator.version_args = validator_args("echo 'ExampleValidator 2.1.0'");
    let service = open_service(config);

    let id = service
        .start_audit(&server.uri(), service.default_options())
        .unwrap();
    let job = wait_for(&service, id).await;
    assert_eq!(job.state, JobState::Complete);

    let report = service.get_report(id).unwrap();
    assert_eq!(report.fail_count, 1);
    assert_eq!(report.validator_version.as_deref(), Some("ExampleValidator 2.1.0"));

    let result = &report.results[0];
    assert_eq!(result.status, ValidationStatus::Fail);
    assert_eq!(result.profile.as_deref(), Some("PDF/UA-1"));
    let rules: Vec<&str> = result
        .rule_findings
        .iter()
        .map(|f| f.rule_id.as_str())
        .collect();
    assert_eq!(rules, vec!["7.1-3", "7.2-2"]);
    assert!(result
        .rule_findings
        .iter()
        .all(|f| f.outcome == FindingOutcome::Failed));

    assert_eq!(report.rule_breakdown["7.1-3"].failed, 1);
    assert_eq!(report.rule_breakdown["7.2-2"].failed, 1);
}

#[tokio::test]
async fn test_slow_validation_times_out_without_blocking_others() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/slow.pdf", "/fast-1.pdf", "/fast-2.pdf"]).await;
    mount_pdf(&server, "/slow.pdf", b"%PDF-1.7 SLOW").await;
    mount_pdf(&server, "/fast-1.pdf", &pdf_bytes("fast 1")).await;
    mount_pdf(&server, "/fast-2.pdf", &pdf_bytes("fast 2")).await;

    let dir = tempfile::tempdir().unwrap();
    let service = open_service(create_test_config(dir.path(), SLOW_MARKER_SCRIPT));
    let options = AuditOptions {
        per_file_timeout: Duration::from_secs(2),
        ..service.default_options()
    };

    let started = Instant::now();
    let id = service.start_audit(&server.uri(), options).unwrap();
    let job = wait_for(&service, id).await;
    assert_eq!(job.state, JobState::Complete);
    assert!(started.elapsed() < Duration::from_secs(20));

    let report = service.get_report(id).unwrap();
    assert_eq!(report.total_files, 3);
    assert_eq!(report.pass_count, 2);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.timeout_count, 1);
    assert!(report.summary().is_consistent());

    let slow = report
        .results
        .iter()
        .find(|r| r.source_url.ends_with("/slow.pdf"))
        .unwrap();
    assert_eq!(slow.status, ValidationStatus::Timeout);
}

#[tokio::test]
async fn test_cancel_while_validating() {
    let server = MockServer::start().await;
    let pdfs = ["/1.pdf", "/2.pdf", "/3.pdf", "/4.pdf"];
    mount_page(&server, "/", &pdfs).await;
    for pdf in pdfs {
        mount_pdf(&server, pdf, &pdf_bytes(pdf)).await;
    }

    let dir = tempfile::tempdir().unwrap();
    let service = open_service(create_test_config(dir.path(), HANG_SCRIPT));
    let options = AuditOptions {
        per_file_timeout: Duration::from_secs(2),
        ..service.default_options()
    };

    let id = service.start_audit(&server.uri(), options).unwrap();
    let busy = eventually(|| {
        service.get_status(id).unwrap().state == JobState::Validating
            && service.validator_invocations() == 2
    })
    .await;
    assert!(busy, "job never reached VALIDATING with both slots busy");

    assert!(service.cancel(id).unwrap());
    let job = wait_for(&service, id).await;
    assert_eq!(job.state, JobState::Cancelled);
    assert!(matches!(
        service.get_report(id),
        Err(FacadeError::NotReady {
            state: JobState::Cancelled,
            ..
        })
    ));

    // in-flight validations run into their timeout, then the job cleans up
    let job_dir = dir.path().join("work").join(id.to_string());
    assert!(eventually(|| !job_dir.exists()).await);
    assert_eq!(service.validator_invocations(), 2);

    // cancelling again is a no-op
    assert!(!service.cancel(id).unwrap());
}

#[tokio::test]
async fn test_unreachable_start_fails_job() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = open_service(create_test_config(dir.path(), PASS_SCRIPT));

    let id = service
        .start_audit(&server.uri(), service.default_options())
        .unwrap();
    let job = wait_for(&service, id).await;

    assert_eq!(job.state, JobState::Failed);
    assert!(job.report.is_none());
    let reason = job.failure_reason.unwrap_or_default();
    assert!(reason.contains("unreachable"), "unexpected reason: {}", reason);
    assert!(matches!(
        service.get_report(id),
        Err(FacadeError::NotReady {
            state: JobState::Failed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_offsite_pdfs_ignored_by_default() {
    let site = MockServer::start().await;
    let other = MockServer::start().await;
    let offsite = format!("{}/elsewhere.pdf", other.uri());
    mount_page(&site, "/", &["/local.pdf", &offsite]).await;
    mount_pdf(&site, "/local.pdf", &pdf_bytes("local")).await;
    Mock::given(method("GET"))
        .and(path("/elsewhere.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_bytes("other"), "application/pdf"))
        .expect(0)
        .mount(&other)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let service = open_service(create_test_config(dir.path(), PASS_SCRIPT));

    let id = service
        .start_audit(&site.uri(), service.default_options())
        .unwrap();
    let job = wait_for(&service, id).await;
    assert_eq!(job.state, JobState::Complete);

    let report = service.get_report(id).unwrap();
    assert_eq!(report.total_files, 1);
    assert!(report.results[0].source_url.ends_with("/local.pdf"));
}

#[tokio::test]
async fn test_report_survives_in_store() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/guide.pdf"]).await;
    mount_pdf(&server, "/guide.pdf", &pdf_bytes("guide")).await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), PASS_SCRIPT);
    let db_path = config.storage.database_path.clone();
    let service = open_service(config);

    let id = service
        .start_audit(&server.uri(), service.default_options())
        .unwrap();
    wait_for(&service, id).await;
    let report = service.get_report(id).unwrap();

    let store = SqliteJobStore::open(&db_path).unwrap();
    assert_eq!(store.load_report(id).unwrap(), Some(report.clone()));
    let job = store.load_job(id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Complete);
    assert_eq!(job.report, Some(report.clone()));

    let export = dir.path().join("report.json");
    report.write_json(&export).unwrap();
    let json = std::fs::read_to_string(&export).unwrap();
    assert!(json.contains("\"status\": \"PASS\""));
    assert!(json.contains("/guide.pdf"));
}
