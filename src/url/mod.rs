//! URL handling module for pdf-audit
//!
//! This module provides URL normalization, origin extraction, wildcard host
//! matching and the crawl scope that decides which links may be followed.

mod matcher;
mod normalize;
mod origin;

use crate::UrlError;
use ::url::Url;

// Re-export main functions
pub use matcher::matches_wildcard;
pub use normalize::{normalize_parsed, normalize_url};
pub use origin::{extract_host, origin_key};

/// Path suffixes that are never fetched as pages
const MEDIA_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".zip", ".gz", ".tar", ".rar",
    ".7z", ".mp3", ".mp4", ".avi", ".mov", ".webm", ".wav", ".css", ".js", ".woff", ".woff2",
    ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
];

/// What a discovered link points at, judged by its path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// A PDF document - handed to the download pipeline
    Pdf,
    /// Anything that may be an HTML page - candidate for traversal
    Page,
    /// Images, archives, media - never fetched
    Media,
}

/// Classifies a link by the extension of its path (case-insensitive)
///
/// # Examples
///
/// ```
/// use url::Url;
/// use pdf_audit::url::{classify_link, LinkKind};
///
/// let url = Url::parse("https://example.com/files/Report.PDF").unwrap();
/// assert_eq!(classify_link(&url), LinkKind::Pdf);
/// ```
pub fn classify_link(url: &Url) -> LinkKind {
    let path = url.path().to_lowercase();

    if path.ends_with(".pdf") {
        LinkKind::Pdf
    } else if MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        LinkKind::Media
    } else {
        LinkKind::Page
    }
}

/// Decides which hosts a job may fetch from
///
/// In same-origin mode only the start URL's origin (see [`origin_key`]) and
/// hosts matching one of the `allowed_hosts` patterns are in scope. With
/// `same_origin_only` off every host is in scope.
#[derive(Debug, Clone)]
pub struct CrawlScope {
    origin: String,
    same_origin_only: bool,
    allowed_hosts: Vec<String>,
}

impl CrawlScope {
    /// Creates the scope for a crawl starting at `start`
    pub fn new(
        start: &Url,
        same_origin_only: bool,
        allowed_hosts: Vec<String>,
    ) -> Result<Self, UrlError> {
        let origin = origin_key(start).ok_or(UrlError::MissingHost)?;
        Ok(Self {
            origin,
            same_origin_only,
            allowed_hosts,
        })
    }

    /// The origin key of the start URL
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Returns true if `url` may be fetched within this scope
    pub fn allows(&self, url: &Url) -> bool {
        if !self.same_origin_only {
            return true;
        }

        if origin_key(url).as_deref() == Some(self.origin.as_str()) {
            return true;
        }

        match extract_host(url) {
            Some(host) => self
                .allowed_hosts
                .iter()
                .any(|pattern| matches_wildcard(pattern, &host)),
            None => false,
        }
    }
}
