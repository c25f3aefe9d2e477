//! Downloader behavior against a mock server: retries, limits and dedup

use crate::common::pdf_bytes;
use pdf_audit::config::UserAgentConfig;
use pdf_audit::crawler::build_http_client;
use pdf_audit::download::{DownloadError, DownloadOutcome, Downloader};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

async fn downloader(dir: &std::path::Path, max_file_size: u64) -> Downloader {
    let client = build_http_client(&user_agent()).unwrap();
    Downloader::create(client, dir.join("job"), max_file_size, Duration::from_secs(5))
        .await
        .unwrap()
        .with_retry_backoff(Duration::from_millis(10))
}

fn url(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), route)).unwrap()
}

#[tokio::test]
async fn test_transient_failure_retried_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky.pdf"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_bytes("flaky"), "application/pdf"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let downloader = downloader(dir.path(), 1024 * 1024).await;

    let outcome = downloader.fetch(&url(&server, "/flaky.pdf")).await.unwrap();
    let DownloadOutcome::Downloaded(resource) = outcome else {
        panic!("expected a fresh download");
    };
    assert_eq!(resource.byte_size, pdf_bytes("flaky").len() as u64);
    assert!(resource.local_path.exists());
    assert_eq!(
        resource.local_path.file_name().unwrap().to_string_lossy(),
        format!("{}.pdf", resource.content_hash)
    );
}

#[tokio::test]
async fn test_client_error_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let downloader = downloader(dir.path(), 1024 * 1024).await;

    let err = downloader
        .fetch(&url(&server, "/gone.pdf"))
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::HttpStatus { status: 404 }));
}

#[tokio::test]
async fn test_persistent_server_error_gives_up_after_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down.pdf"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let downloader = downloader(dir.path(), 1024 * 1024).await;

    let err = downloader
        .fetch(&url(&server, "/down.pdf"))
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_oversize_rejected_and_nothing_left_behind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![b'x'; 2048], "application/pdf"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let downloader = downloader(dir.path(), 1000).await;

    let err = downloader
        .fetch(&url(&server, "/big.pdf"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DownloadError::TooLarge {
            size: 2048,
            limit: 1000
        }
    ));
    assert_eq!(std::fs::read_dir(downloader.dir()).unwrap().count(), 0);
    assert!(downloader.is_empty());
}

#[tokio::test]
async fn test_duplicate_content_becomes_alias() {
    let server = MockServer::start().await;
    for route in ["/a.pdf", "/b.pdf", "/c.pdf"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_bytes("same"), "application/pdf"))
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let downloader = downloader(dir.path(), 1024 * 1024).await;

    let first = downloader.fetch(&url(&server, "/a.pdf")).await.unwrap();
    assert!(matches!(first, DownloadOutcome::Downloaded(_)));
    let second = downloader.fetch(&url(&server, "/b.pdf")).await.unwrap();
    let third = downloader.fetch(&url(&server, "/c.pdf")).await.unwrap();
    assert!(matches!(second, DownloadOutcome::Duplicate(_)));
    assert_eq!(third.resource().source_url, url(&server, "/a.pdf").to_string());

    assert_eq!(downloader.len(), 1);
    let aliases = downloader.aliases();
    assert_eq!(
        aliases[&first.resource().resource_ref()],
        vec![
            url(&server, "/b.pdf").to_string(),
            url(&server, "/c.pdf").to_string()
        ]
    );
    // one stored file, no leftovers
    assert_eq!(std::fs::read_dir(downloader.dir()).unwrap().count(), 1);
}
