//! Shared fixtures: test configuration, mock site helpers and validator scripts

use pdf_audit::config::{parse_config, Config};
use pdf_audit::{AuditJob, AuditService};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Validator that passes every file
pub const PASS_SCRIPT: &str = r#"echo '{"verdict": "PASS", "profile": "PDF/UA-1", "findings": []}'"#;

/// Validator that fails every file with two findings
pub const FAIL_SCRIPT: &str = r#"echo '{"verdict": "FAIL", "profile": "PDF/UA-1", "findings": [{"rule_id": "7.1-3", "outcome": "failed", "message": "Content is not tagged"}, {"rule_id": "7.2-2", "outcome": "failed", "message": "Document language is missing"}]}'"#;

/// Validator that hangs on files containing the marker `SLOW` and passes the rest
pub const SLOW_MARKER_SCRIPT: &str = r#"if grep -q SLOW "$1"; then exec sleep 30; fi; echo '{"verdict": "PASS", "findings": []}'"#;

/// Validator that never finishes on its own
pub const HANG_SCRIPT: &str = "exec sleep 30";

/// Creates a test configuration rooted at `dir` using `script` as the validator
///
/// Robots.txt and sitemaps are off and there is no politeness delay; tests
/// that need them switch them back on.
pub fn create_test_config(dir: &Path, script: &str) -> Config {
    let toml = format!(
        r#"
[audit]
max-depth = 2
max-pages = 50
per-file-timeout-secs = 10
max-file-size = 1048576
same-origin-only = true

[crawler]
max-concurrent-fetches = 4
max-concurrent-validations = 2
page-timeout-secs = 5
download-timeout-secs = 5
politeness-delay-ms = 0
respect-robots-txt = false
use-sitemap = false

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[validator]
command = "sh"
version-args = []

[storage]
work-dir = '{}'
database-path = '{}'

[supervisor]
heartbeat-every = 2
"#,
        dir.join("work").display(),
        dir.join("jobs.db").display()
    );

    let mut config = parse_config(&toml).expect("test config must be valid");
    config.validator.args = validator_args(script);
    config
}

/// `sh -c <script> validator <file>`: the file path arrives as `$1`
pub fn validator_args(script: &str) -> Vec<String> {
    vec![
        "-c".to_string(),
        script.to_string(),
        "validator".to_string(),
    ]
}

/// Opens a service with restart recovery, as the binary does
pub fn open_service(config: Config) -> Arc<AuditService> {
    Arc::new(AuditService::open(config).expect("service should open"))
}

/// Waits for a job to finish, failing the test after 30 seconds
pub async fn wait_for(service: &AuditService, id: Uuid) -> AuditJob {
    tokio::time::timeout(Duration::from_secs(30), service.wait(id))
        .await
        .expect("job did not finish in time")
        .expect("job should exist")
}

/// Polls `check` every 20ms for up to 10 seconds
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// HTML page with one anchor per href
pub fn html_page(title: &str, hrefs: &[&str]) -> String {
    let links: String = hrefs
        .iter()
        .map(|href| format!(r#"<a href="{}">{}</a>"#, href, href))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "<html><head><title>{}</title></head><body>\n{}\n</body></html>",
        title, links
    )
}

/// Serves an HTML page at `route`
pub async fn mount_page(server: &MockServer, route: &str, hrefs: &[&str]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html_page(route, hrefs), "text/html"))
        .mount(server)
        .await;
}

/// Serves an HTML page at `route` that must be requested exactly `times` times
pub async fn mount_page_expect(server: &MockServer, route: &str, hrefs: &[&str], times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html_page(route, hrefs), "text/html"))
        .expect(times)
        .mount(server)
        .await;
}

/// Serves `body` as a PDF at `route`
pub async fn mount_pdf(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_vec(), "application/pdf"))
        .mount(server)
        .await;
}

/// A small PDF-like body; distinct tags give distinct content hashes
pub fn pdf_bytes(tag: &str) -> Vec<u8> {
    format!("%PDF-1.7\n% {}\n%%EOF\n", tag).into_bytes()
}

/// Number of requests the server received for `route`
pub async fn request_count(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == route)
        .count()
}
