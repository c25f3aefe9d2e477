use super::{DownloadError, PdfResource};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

/// What a fetch produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// First time this content was seen; it must be validated
    Downloaded(PdfResource),
    /// Same bytes as an earlier download; the URL was recorded as an alias
    Duplicate(PdfResource),
}

impl DownloadOutcome {
    pub fn resource(&self) -> &PdfResource {
        match self {
            Self::Downloaded(r) | Self::Duplicate(r) => r,
        }
    }
}

/// Downloads PDFs of one job into its working directory
///
/// Safe to share between tasks; the hash registry lock is never held across
/// an await.
#[derive(Debug)]
pub struct Downloader {
    client: Client,
    dir: PathBuf,
    max_file_size: u64,
    timeout: Duration,
    retry_backoff: Duration,
    registry: Mutex<HashMap<String, PdfResource>>,
    partials: AtomicU64,
}

impl Downloader {
    /// Creates a downloader writing into `dir` (created if missing)
    pub async fn create(
        client: Client,
        dir: impl Into<PathBuf>,
        max_file_size: u64,
        timeout: Duration,
    ) -> std::io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        Ok(Self {
            client,
            dir,
            max_file_size,
            timeout,
            retry_backoff: Duration::from_secs(2),
            registry: Mutex::new(HashMap::new()),
            partials: AtomicU64::new(0),
        })
    }

    /// Overrides the pause before the single retry
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Downloads `url`, retrying once on a transient failure
    pub async fn fetch(&self, url: &Url) -> Result<DownloadOutcome, DownloadError> {
        let (partial, hash, size) = match self.fetch_once(url).await {
            Err(e) if e.is_transient() => {
                tracing::warn!(url = %url, error = %e, "download failed, retrying once");
                tokio::time::sleep(self.retry_backoff).await;
                self.fetch_once(url).await?
            }
            other => other?,
        };

        Ok(self.register(url, partial, hash, size).await?)
    }

    /// resource_ref -> alias URLs of every resource that has any
    pub fn aliases(&self) -> BTreeMap<String, Vec<String>> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| !r.aliases.is_empty())
            .map(|r| (r.resource_ref(), r.aliases.clone()))
            .collect()
    }

    /// Number of distinct documents downloaded
    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn fetch_once(&self, url: &Url) -> Result<(PathBuf, String, u64), DownloadError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(DownloadError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                status: status.as_u16(),
            });
        }

        if let Some(length) = response.content_length() {
            if length > self.max_file_size {
                return Err(DownloadError::TooLarge {
                    size: length,
                    limit: self.max_file_size,
                });
            }
        }

        let n = self.partials.fetch_add(1, Ordering::Relaxed);
        let partial = self.dir.join(format!(".part-{}", n));

        match self.stream_to(response, &partial).await {
            Ok((hash, size)) => Ok((partial, hash, size)),
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    async fn stream_to(
        &self,
        mut response: reqwest::Response,
        path: &Path,
    ) -> Result<(String, u64), DownloadError> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;

        while let Some(chunk) = response.chunk().await.map_err(DownloadError::from_reqwest)? {
            size += chunk.len() as u64;
            if size > self.max_file_size {
                return Err(DownloadError::TooLarge {
                    size,
                    limit: self.max_file_size,
                });
            }
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok((hex::encode(hasher.finalize()), size))
    }

    async fn register(
        &self,
        url: &Url,
        partial: PathBuf,
        hash: String,
        size: u64,
    ) -> std::io::Result<DownloadOutcome> {
        let final_path = self.dir.join(format!("{}.pdf", hash));

        let duplicate = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            match registry.get_mut(&hash) {
                Some(existing) => {
                    existing.add_alias(url.as_str());
                    Some(existing.clone())
                }
                None => {
                    registry.insert(
                        hash.clone(),
                        PdfResource {
                            source_url: url.to_string(),
                            local_path: final_path.clone(),
                            byte_size: size,
                            content_hash: hash.clone(),
                            aliases: Vec::new(),
                        },
                    );
                    None
                }
            }
        };

        if let Some(existing) = duplicate {
            tracing::debug!(url = %url, original = %existing.source_url, "duplicate content");
            tokio::fs::remove_file(&partial).await?;
            return Ok(DownloadOutcome::Duplicate(existing));
        }

        tokio::fs::rename(&partial, &final_path).await?;
        tracing::debug!(url = %url, bytes = size, hash = %hash, "pdf downloaded");

        Ok(DownloadOutcome::Downloaded(PdfResource {
            source_url: url.to_string(),
            local_path: final_path,
            byte_size: size,
            content_hash: hash,
            aliases: Vec::new(),
        }))
    }
}
