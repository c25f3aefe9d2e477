use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A downloaded PDF, identified by the SHA-256 of its bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfResource {
    /// URL the content was first fetched from
    pub source_url: String,
    pub local_path: PathBuf,
    pub byte_size: u64,
    /// Lowercase hex SHA-256
    pub content_hash: String,
    /// Further URLs that served the same bytes
    pub aliases: Vec<String>,
}

impl PdfResource {
    /// Identity used in validation results
    pub fn resource_ref(&self) -> String {
        format!("sha256:{}", self.content_hash)
    }

    /// Records another URL for this content; returns false if already known
    pub fn add_alias(&mut self, url: &str) -> bool {
        if url == self.source_url || self.aliases.iter().any(|a| a == url) {
            return false;
        }
        self.aliases.push(url.to_string());
        true
    }
}
