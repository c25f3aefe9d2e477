//! Integration tests for the crawler's politeness and discovery features
//!
//! These tests switch robots.txt handling and sitemap seeding back on and
//! drive the crawl engine directly as well as through full audits.

use crate::common::*;
use pdf_audit::config::CrawlerConfig;
use pdf_audit::crawler::{build_http_client, CrawlEvent, CrawlSettings, Crawler};
use pdf_audit::{AuditError, AuditOptions, CrawlScope, JobState};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_sitemap_seeds_unlinked_pdfs() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &[]).await;
    mount_pdf(&server, "/hidden/annual-report.pdf", &pdf_bytes("annual")).await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{0}/</loc></url>
  <url><loc>{0}/hidden/annual-report.pdf</loc></url>
  <url><loc>https://elsewhere.example/offsite.pdf</loc></url>
</urlset>"#,
                server.uri()
            ),
            "application/xml",
        ))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path(), PASS_SCRIPT);
    config.crawler.use_sitemap = true;
    let service = open_service(config);

    let id = service
        .start_audit(&server.uri(), service.default_options())
        .unwrap();
    let job = wait_for(&service, id).await;
    assert_eq!(job.state, JobState::Complete, "{:?}", job.failure_reason);

    let report = service.get_report(id).unwrap();
    assert_eq!(report.total_files, 1);
    assert_eq!(
        report.results[0].source_url,
        format!("{}/hidden/annual-report.pdf", server.uri())
    );
}

#[tokio::test]
async fn test_robots_disallowed_pages_are_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/\n"),
        )
        .mount(&server)
        .await;
    mount_page(&server, "/", &["/private/staff", "/public.pdf"]).await;
    mount_page_expect(&server, "/private/staff", &["/private/salaries.pdf"], 0).await;
    mount_pdf(&server, "/public.pdf", &pdf_bytes("public")).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path(), PASS_SCRIPT);
    config.crawler.respect_robots_txt = true;
    let service = open_service(config);

    let id = service
        .start_audit(&server.uri(), service.default_options())
        .unwrap();
    let job = wait_for(&service, id).await;
    assert_eq!(job.state, JobState::Complete);
    assert_eq!(job.progress.pages_crawled, 1);
    assert_eq!(job.progress.pages_skipped, 1);
    assert_eq!(service.get_report(id).unwrap().total_files, 1);
    assert_eq!(request_count(&server, "/robots.txt").await, 1);
}

#[tokio::test]
async fn test_robots_disallowed_start_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .mount(&server)
        .await;
    mount_page_expect(&server, "/", &["/doc.pdf"], 0).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path(), PASS_SCRIPT);
    config.crawler.respect_robots_txt = true;
    let service = open_service(config);

    let id = service
        .start_audit(&server.uri(), service.default_options())
        .unwrap();
    let job = wait_for(&service, id).await;
    assert_eq!(job.state, JobState::Failed);
    assert!(job
        .failure_reason
        .unwrap_or_default()
        .contains("robots.txt"));
}

#[tokio::test]
async fn test_robots_group_naming_the_bot_is_honored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "User-agent: TestBot\nDisallow: /\n\nUser-agent: *\nAllow: /\n",
        ))
        .mount(&server)
        .await;
    mount_page_expect(&server, "/", &["/doc.pdf"], 0).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path(), PASS_SCRIPT);
    config.crawler.respect_robots_txt = true;
    let service = open_service(config);

    let id = service
        .start_audit(&server.uri(), service.default_options())
        .unwrap();
    let job = wait_for(&service, id).await;
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(service.validator_invocations(), 0);
}

/// Runs the crawl engine alone and collects its events
async fn crawl_events(
    server: &MockServer,
    options: &AuditOptions,
) -> (Result<pdf_audit::crawler::CrawlStats, AuditError>, Vec<CrawlEvent>) {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), PASS_SCRIPT);
    let client = build_http_client(&config.user_agent).unwrap();
    let start = pdf_audit::normalize_url(&server.uri()).unwrap();
    let scope = CrawlScope::new(&start, true, Vec::new()).unwrap();
    let crawler_config = CrawlerConfig {
        politeness_delay_ms: 0,
        respect_robots_txt: false,
        use_sitemap: false,
        ..config.crawler.clone()
    };

    let (tx, mut rx) = mpsc::channel(8);
    let crawler = Crawler::new(
        client,
        scope,
        CrawlSettings::new(options, &crawler_config),
        "TestBot",
        Arc::new(AtomicBool::new(false)),
        tx,
    );
    let handle = tokio::spawn(crawler.run(start));

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (handle.await.unwrap(), events)
}

#[tokio::test]
async fn test_engine_reports_pdf_served_from_page_url() {
    let server = MockServer::start().await;
    // a link without .pdf that answers with a PDF
    mount_page(&server, "/", &["/download?id=7", "/logo.png", "/broken"]).await;
    Mock::given(method("GET"))
        .and(path("/download"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_bytes("7"), "application/pdf"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 8], "image/png"))
        .expect(0)
        .mount(&server)
        .await;

    let options = AuditOptions {
        max_depth: 2,
        ..AuditOptions::default()
    };
    let (stats, events) = crawl_events(&server, &options).await;
    let stats = stats.unwrap();

    let pdfs: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            CrawlEvent::PdfFound { url, .. } => Some(url.path().to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(pdfs, vec!["/download".to_string()]);

    // the 404 is skipped, not fatal
    let skipped = events
        .iter()
        .filter(|e| matches!(e, CrawlEvent::PageSkipped { .. }))
        .count();
    assert_eq!(skipped, 1);
    assert_eq!(stats.pages_skipped, 1);
    assert_eq!(stats.pdfs_found, 1);
    assert!(!stats.limit_reached);
}

#[tokio::test]
async fn test_engine_ignores_pages_redirected_off_site() {
    let other = MockServer::start().await;
    mount_page(&other, "/landing", &["/secret.pdf"]).await;

    let server = MockServer::start().await;
    mount_page(&server, "/", &["/moved"]).await;
    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/landing", other.uri()).as_str()),
        )
        .mount(&server)
        .await;

    let options = AuditOptions {
        max_depth: 2,
        ..AuditOptions::default()
    };
    let (stats, events) = crawl_events(&server, &options).await;
    let stats = stats.unwrap();

    assert!(!events
        .iter()
        .any(|e| matches!(e, CrawlEvent::PdfFound { .. })));
    let reasons: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            CrawlEvent::PageSkipped { url, reason, .. } if url.path() == "/moved" => {
                Some(reason.as_str())
            }
            _ => None,
        })
        .collect();
    assert_eq!(reasons.len(), 1);
    assert!(reasons[0].contains("out of scope"));
    assert_eq!(stats.pdfs_found, 0);
}

#[tokio::test]
async fn test_engine_start_page_error_is_fatal() {
    let server = MockServer::start().await;

    let (stats, events) = crawl_events(&server, &AuditOptions::default()).await;
    assert!(matches!(stats, Err(AuditError::StartUnreachable { .. })));
    assert!(events.is_empty());
}
