//! Service restarts: interrupted jobs, retained reports and the job list

use crate::common::*;
use pdf_audit::facade::INTERRUPTED_REASON;
use pdf_audit::storage::{JobStore, SqliteJobStore};
use pdf_audit::{AuditJob, AuditOptions, JobState};
use wiremock::MockServer;

#[tokio::test]
async fn test_restart_cancels_interrupted_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), PASS_SCRIPT);

    // a job a previous process left mid-crawl
    let mut job = AuditJob::new("https://example.com/", AuditOptions::default());
    job.state = JobState::Crawling;
    job.progress.pages_crawled = 4;
    {
        let store = SqliteJobStore::open(&config.storage.database_path).unwrap();
        store.save_job(&job).unwrap();
    }

    let service = open_service(config);
    let recovered = service.get_status(job.id).unwrap();
    assert_eq!(recovered.state, JobState::Cancelled);
    assert_eq!(recovered.failure_reason.as_deref(), Some(INTERRUPTED_REASON));
    assert_eq!(recovered.progress.pages_crawled, 4);
    assert!(!service.cancel(job.id).unwrap());
}

#[tokio::test]
async fn test_completed_report_retrievable_after_restart() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/policy.pdf"]).await;
    mount_pdf(&server, "/policy.pdf", &pdf_bytes("policy")).await;

    let dir = tempfile::tempdir().unwrap();
    let id = {
        let service = open_service(create_test_config(dir.path(), PASS_SCRIPT));
        let id = service
            .start_audit(&server.uri(), service.default_options())
            .unwrap();
        assert_eq!(wait_for(&service, id).await.state, JobState::Complete);
        id
    };

    let service = open_service(create_test_config(dir.path(), PASS_SCRIPT));
    let report = service.get_report(id).unwrap();
    assert_eq!(report.job_id, id);
    assert_eq!(report.pass_count, 1);

    let jobs = service.list_jobs().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].state, JobState::Complete);
}
