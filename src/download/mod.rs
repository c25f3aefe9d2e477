//! PDF download module
//!
//! Fetches discovered PDFs into the job's working directory, hashing the body
//! while it streams. Files are stored as `<sha256>.pdf`; a URL whose content
//! was already downloaded becomes an alias of the existing resource.

mod downloader;
mod resource;

pub use downloader::{DownloadOutcome, Downloader};
pub use resource::PdfResource;

use thiserror::Error;

/// Reasons a PDF could not be downloaded
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("file exceeds size limit ({size} > {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    #[error("HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Whether a single retry is worthwhile (connect/timeout/5xx)
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::HttpStatus { status } => *status >= 500,
            Self::TooLarge { .. } | Self::Io(_) => false,
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Network("request timeout".to_string())
        } else if e.is_connect() {
            Self::Network("connection failed".to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}
