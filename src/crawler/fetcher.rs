//! HTTP fetcher implementation
//!
//! This module handles page requests for the crawler:
//! - Building the shared HTTP client with the crawler's user agent
//! - Classifying responses by Content-Type before reading the body
//! - Error classification

use crate::config::UserAgentConfig;
use crate::url::CrawlScope;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use url::Url;

/// Maximum redirect hops followed for a single request
const MAX_REDIRECTS: usize = 10;

/// Result of a page fetch
#[derive(Debug)]
pub enum FetchResult {
    /// An HTML page
    Html {
        /// Final URL after redirects
        final_url: Url,
        /// Page body content
        body: String,
    },

    /// The URL answered with a PDF; the body is left unread
    Pdf {
        /// Final URL after redirects
        final_url: Url,
    },

    /// Redirects ended outside the crawl scope; the body is left unread
    OutOfScope {
        /// Where the redirects led
        final_url: Url,
    },

    /// Neither HTML nor PDF
    ContentMismatch {
        /// The actual Content-Type received
        content_type: String,
    },

    /// Non-success HTTP status
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Network error (connection refused, timeout, TLS, etc.)
    NetworkError {
        /// Error description
        error: String,
    },
}

impl FetchResult {
    /// Short reason used for skipped-page events
    pub fn skip_reason(&self) -> Option<String> {
        match self {
            Self::Html { .. } | Self::Pdf { .. } => None,
            Self::ContentMismatch { content_type } => {
                Some(format!("not HTML (Content-Type: {})", content_type))
            }
            Self::OutOfScope { final_url } => {
                Some(format!("redirected out of scope to {}", final_url))
            }
            Self::HttpError { status_code } => Some(format!("HTTP {}", status_code)),
            Self::NetworkError { error } => Some(error.clone()),
        }
    }
}

/// Builds the HTTP client shared by the crawler and the downloader
///
/// Per-request timeouts are set by the callers; the client only bounds
/// connection setup.
///
/// # Example
///
/// ```
/// use pdf_audit::config::UserAgentConfig;
/// use pdf_audit::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "PdfAudit".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches one page
///
/// The Content-Type is checked before the body is read, so PDFs and other
/// binaries reached through page links are never downloaded here.
///
/// | Condition | Result |
/// |-----------|--------|
/// | 2xx after redirects leading outside `scope` | OutOfScope |
/// | 2xx `text/html`, `application/xhtml+xml` or no Content-Type | Html |
/// | 2xx `application/pdf` | Pdf |
/// | 2xx anything else | ContentMismatch |
/// | non-2xx | HttpError |
/// | timeout, refused, TLS, redirect loop | NetworkError |
pub async fn fetch_page(
    client: &Client,
    url: &Url,
    timeout: Duration,
    scope: &CrawlScope,
) -> FetchResult {
    let response = match client.get(url.clone()).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => return classify_error(&e),
    };

    let status = response.status();
    if !status.is_success() {
        return FetchResult::HttpError {
            status_code: status.as_u16(),
        };
    }

    let final_url = response.url().clone();
    if !scope.allows(&final_url) {
        return FetchResult::OutOfScope { final_url };
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase())
        .unwrap_or_default();

    if content_type.starts_with("application/pdf") {
        return FetchResult::Pdf { final_url };
    }

    let is_html = content_type.is_empty()
        || content_type.starts_with("text/html")
        || content_type.starts_with("application/xhtml+xml");
    if !is_html {
        return FetchResult::ContentMismatch { content_type };
    }

    match response.text().await {
        Ok(body) => FetchResult::Html { final_url, body },
        Err(e) => classify_error(&e),
    }
}

fn classify_error(e: &reqwest::Error) -> FetchResult {
    let error = if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        "connection failed".to_string()
    } else if e.is_redirect() {
        "too many redirects".to_string()
    } else {
        e.to_string()
    };
    FetchResult::NetworkError { error }
}
