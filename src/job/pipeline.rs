//! The crawl → download → validate → aggregate pipeline of one job
//!
//! Validation overlaps crawling: every PDF the crawler reports is handed to a
//! file task right away. The job task is the single writer of the
//! aggregator; file tasks only return results.

use crate::config::Config;
use crate::crawler::{CrawlEvent, CrawlSettings, Crawler};
use crate::download::{DownloadOutcome, Downloader};
use crate::job::JobController;
use crate::report::{Aggregator, ValidationResult};
use crate::state::JobState;
use crate::storage::JobStore;
use crate::url::{normalize_url, CrawlScope};
use crate::validator::ValidatorInvoker;
use crate::AuditError;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use url::Url;

/// Capacity of the crawler → job event channel
const EVENT_BUFFER: usize = 64;

/// Shared services a job runs against
#[derive(Clone)]
pub struct PipelineContext {
    pub client: Client,
    pub config: Arc<Config>,
    pub invoker: Arc<ValidatorInvoker>,
    pub store: Arc<dyn JobStore>,
}

/// What became of one discovered PDF
enum FileOutcome {
    /// A result for the report
    Validated(ValidationResult),
    /// Same content as an earlier file; recorded as an alias
    Alias,
    /// Not processed because the job was cancelled
    Dropped,
}

/// Per-file limits and shared handles, cloned into every file task
#[derive(Clone)]
struct FileWork {
    downloader: Arc<Downloader>,
    invoker: Arc<ValidatorInvoker>,
    downloads: Arc<Semaphore>,
    validations: Arc<Semaphore>,
    cancel: Arc<AtomicBool>,
    timeout: Duration,
}

/// Runs a job to a terminal state
///
/// Errors never escape: a fatal error marks the job FAILED. Working files of
/// jobs that did not complete are removed.
pub async fn run_job(controller: Arc<JobController>, ctx: PipelineContext) {
    let job_dir = ctx
        .config
        .storage
        .work_dir
        .join(controller.id().to_string());

    match execute(&controller, &ctx, &job_dir).await {
        Ok(()) => {}
        Err(e) if controller.state().is_terminal() => {
            tracing::debug!(job = %controller.id(), error = %e, "job stopped after cancellation");
        }
        Err(e) => {
            if let Err(transition) = controller.fail(e.to_string()) {
                tracing::warn!(job = %controller.id(), error = %transition, "could not mark job failed");
            }
        }
    }

    if controller.state() != JobState::Complete {
        discard_job_dir(&job_dir).await;
    }
}

async fn execute(
    controller: &JobController,
    ctx: &PipelineContext,
    job_dir: &Path,
) -> Result<(), AuditError> {
    let job = controller.snapshot();
    let options = job.options.clone();
    controller.transition(JobState::Crawling)?;

    let start = normalize_url(&job.target_url)?;
    let scope = CrawlScope::new(
        &start,
        options.same_origin_only,
        ctx.config.crawler.allowed_hosts.clone(),
    )?;

    let downloader = Downloader::create(
        ctx.client.clone(),
        PathBuf::from(job_dir),
        options.max_file_size,
        Duration::from_secs(ctx.config.crawler.download_timeout_secs),
    )
    .await?;
    let downloader = Arc::new(downloader);

    let version = {
        let invoker = ctx.invoker.clone();
        tokio::spawn(async move { invoker.version().await })
    };

    let cancel = controller.cancel_flag();
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
    let crawler = Crawler::new(
        ctx.client.clone(),
        scope,
        CrawlSettings::new(&options, &ctx.config.crawler),
        ctx.config.user_agent.robots_token(),
        cancel.clone(),
        tx,
    );
    let mut crawl = Some(tokio::spawn(crawler.run(start.clone())));

    let work = FileWork {
        downloader: downloader.clone(),
        invoker: ctx.invoker.clone(),
        downloads: Arc::new(Semaphore::new(
            ctx.config.crawler.max_concurrent_fetches.max(1) as usize,
        )),
        validations: Arc::new(Semaphore::new(
            ctx.config.crawler.max_concurrent_validations.max(1) as usize,
        )),
        cancel: cancel.clone(),
        timeout: options.per_file_timeout,
    };

    let mut aggregator = Aggregator::new(controller.id());
    let mut files: JoinSet<FileOutcome> = JoinSet::new();
    let mut crawl_open = true;

    loop {
        tokio::select! {
            event = rx.recv(), if crawl_open => match event {
                Some(event) => handle_event(controller, event, &work, &mut files),
                None => {
                    crawl_open = false;
                    if let Some(handle) = crawl.take() {
                        let stats = match handle.await {
                            Ok(Ok(stats)) => stats,
                            Ok(Err(e)) => {
                                files.shutdown().await;
                                return Err(e);
                            }
                            Err(e) => {
                                files.shutdown().await;
                                return Err(AuditError::Invariant(format!("crawl task panicked: {}", e)));
                            }
                        };
                        tracing::info!(
                            job = %controller.id(),
                            pages = stats.pages_crawled,
                            skipped = stats.pages_skipped,
                            pdfs = stats.pdfs_found,
                            limit_reached = stats.limit_reached,
                            "crawl finished"
                        );
                    }
                    if !controller.is_cancelled() {
                        controller.transition(JobState::Validating)?;
                    }
                }
            },
            joined = files.join_next(), if !files.is_empty() => match joined {
                Some(Ok(outcome)) => fold(controller, &mut aggregator, outcome)?,
                Some(Err(e)) => {
                    return Err(AuditError::Invariant(format!("file task panicked: {}", e)));
                }
                None => {}
            },
            else => break,
        }
    }

    if controller.is_cancelled() {
        tracing::info!(
            job = %controller.id(),
            discarded = aggregator.len(),
            "job cancelled, partial results discarded"
        );
        return Ok(());
    }

    controller.transition(JobState::Aggregating)?;
    let validator_version = version.await.unwrap_or(None);
    let report = aggregator.finish(job.target_url, validator_version, downloader.aliases());

    ctx.store.save_report(&report)?;
    tracing::info!(
        job = %controller.id(),
        files = report.total_files,
        pass = report.pass_count,
        fail = report.fail_count,
        error = report.error_count,
        "audit complete"
    );
    controller.complete(report)
}

fn handle_event(
    controller: &JobController,
    event: CrawlEvent,
    work: &FileWork,
    files: &mut JoinSet<FileOutcome>,
) {
    match event {
        CrawlEvent::PageCrawled { url, links, .. } => {
            tracing::debug!(url = %url, links, "page crawled");
            controller.record(|p| p.pages_crawled += 1);
        }
        CrawlEvent::PageSkipped { .. } => {
            controller.record(|p| p.pages_skipped += 1);
        }
        CrawlEvent::PdfFound { url, depth, .. } => {
            controller.record(|p| p.files_found += 1);
            if controller.is_cancelled() {
                return;
            }
            tracing::debug!(url = %url, depth, "pdf found");
            files.spawn(process_file(url, work.clone()));
        }
    }
}

fn fold(
    controller: &JobController,
    aggregator: &mut Aggregator,
    outcome: FileOutcome,
) -> Result<(), AuditError> {
    match outcome {
        FileOutcome::Validated(result) => {
            let summary = aggregator.add(result);
            if !summary.is_consistent() {
                return Err(AuditError::Invariant(format!(
                    "report counts do not add up: {:?}",
                    summary
                )));
            }
        }
        FileOutcome::Alias => {}
        FileOutcome::Dropped => return Ok(()),
    }
    controller.record(|p| p.files_validated += 1);
    Ok(())
}

async fn process_file(url: Url, work: FileWork) -> FileOutcome {
    let resource = {
        let Ok(_permit) = work.downloads.acquire().await else {
            return FileOutcome::Dropped;
        };
        if work.cancel.load(Ordering::SeqCst) {
            return FileOutcome::Dropped;
        }

        match work.downloader.fetch(&url).await {
            Ok(DownloadOutcome::Downloaded(resource)) => resource,
            Ok(DownloadOutcome::Duplicate(resource)) => {
                tracing::debug!(url = %url, of = %resource.source_url, "duplicate content");
                return FileOutcome::Alias;
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "download failed");
                return FileOutcome::Validated(ValidationResult::error(
                    url.as_str(),
                    url.as_str(),
                    format!("download failed: {}", e),
                ));
            }
        }
    };

    let Ok(_permit) = work.validations.acquire().await else {
        return FileOutcome::Dropped;
    };
    if work.cancel.load(Ordering::SeqCst) {
        return FileOutcome::Dropped;
    }

    let result = work.invoker.validate(&resource, work.timeout).await;
    tracing::debug!(url = %url, status = %result.status, ms = result.duration_ms, "file validated");
    FileOutcome::Validated(result)
}

async fn discard_job_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => tracing::debug!(dir = %dir.display(), "removed working directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "failed to remove working directory"),
    }
}
