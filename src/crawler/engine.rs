//! Crawl engine - breadth-first traversal of one site
//!
//! The engine owns the frontier and the robots cache for the lifetime of one
//! crawl. Page fetches run as tasks on a `JoinSet`, bounded by a semaphore;
//! everything the crawl discovers is streamed to the caller as
//! [`CrawlEvent`]s over a bounded channel.

use crate::config::{AuditOptions, CrawlerConfig};
use crate::crawler::fetcher::{fetch_page, FetchResult};
use crate::crawler::frontier::{CrawlTarget, Frontier};
use crate::crawler::parser::parse_html;
use crate::crawler::sitemap::fetch_sitemap_pdfs;
use crate::robots::RobotsCache;
use crate::url::{classify_link, normalize_parsed, CrawlScope, LinkKind};
use crate::AuditError;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use url::Url;

/// Upper bound for a robots.txt `Crawl-delay`
const MAX_CRAWL_DELAY: Duration = Duration::from_secs(30);

/// Something the crawl discovered or did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    /// A PDF URL within scope, reported once per crawl
    PdfFound {
        url: Url,
        depth: u32,
        /// Page the link was found on; None for sitemap entries
        found_on: Option<Url>,
    },

    /// A page was fetched and its links processed
    PageCrawled { url: Url, depth: u32, links: usize },

    /// A page was not crawled (robots.txt, HTTP error, not HTML)
    PageSkipped { url: Url, depth: u32, reason: String },
}

/// Totals of a finished crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Page requests issued (never above max_pages)
    pub page_fetches: u64,
    pub pages_crawled: u64,
    pub pages_skipped: u64,
    pub pdfs_found: u64,
    /// True if max_pages cut the traversal short
    pub limit_reached: bool,
    pub cancelled: bool,
}

/// Limits and toggles of one crawl
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub max_depth: u32,
    pub max_pages: u32,
    pub max_concurrent_fetches: usize,
    pub page_timeout: Duration,
    pub politeness_delay: Duration,
    pub respect_robots_txt: bool,
    pub use_sitemap: bool,
}

impl CrawlSettings {
    /// Combines per-job options with the service-wide crawler configuration
    pub fn new(options: &AuditOptions, crawler: &CrawlerConfig) -> Self {
        Self {
            max_depth: options.max_depth,
            max_pages: options.max_pages,
            max_concurrent_fetches: crawler.max_concurrent_fetches.max(1) as usize,
            page_timeout: Duration::from_secs(crawler.page_timeout_secs),
            politeness_delay: Duration::from_millis(crawler.politeness_delay_ms),
            respect_robots_txt: crawler.respect_robots_txt,
            use_sitemap: crawler.use_sitemap,
        }
    }
}

/// One crawl, from start URL to an empty frontier
///
/// A crawler is consumed by [`Crawler::run`] and cannot be restarted.
pub struct Crawler {
    client: Client,
    scope: CrawlScope,
    settings: CrawlSettings,
    robots: RobotsCache,
    frontier: Frontier,
    stats: CrawlStats,
    cancel: Arc<AtomicBool>,
    events: mpsc::Sender<CrawlEvent>,
}

impl Crawler {
    pub fn new(
        client: Client,
        scope: CrawlScope,
        settings: CrawlSettings,
        agent: &str,
        cancel: Arc<AtomicBool>,
        events: mpsc::Sender<CrawlEvent>,
    ) -> Self {
        let robots = RobotsCache::new(
            client.clone(),
            agent,
            settings.page_timeout,
            settings.respect_robots_txt,
        );

        Self {
            client,
            scope,
            settings,
            robots,
            frontier: Frontier::new(),
            stats: CrawlStats::default(),
            cancel,
            events,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Runs the crawl to completion
    ///
    /// Returns an error only if the start page cannot be fetched; every
    /// other fetch failure becomes a [`CrawlEvent::PageSkipped`].
    pub async fn run(mut self, start: Url) -> Result<CrawlStats, AuditError> {
        let start = normalize_parsed(start)?;
        tracing::info!(url = %start, max_depth = self.settings.max_depth,
            max_pages = self.settings.max_pages, "crawl started");

        let delay = self.effective_delay(&start).await;

        self.crawl_start_page(&start).await?;

        if self.settings.use_sitemap && !self.is_cancelled() {
            self.seed_from_sitemap(&start).await;
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_fetches));
        let mut tasks: JoinSet<(CrawlTarget, FetchResult)> = JoinSet::new();

        loop {
            if self.is_cancelled() {
                self.stats.cancelled = true;
                break;
            }

            self.dispatch(&semaphore, &mut tasks, delay).await;

            let Some(joined) = tasks.join_next().await else {
                break;
            };

            match joined {
                Ok((target, result)) => {
                    if !self.handle_fetch(target, result).await {
                        self.stats.cancelled = true;
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "page fetch task failed"),
            }
        }

        // in-flight fetches resolve; their results are discarded
        while tasks.join_next().await.is_some() {}

        tracing::info!(
            dispatched = self.frontier.dispatched(),
            seen = self.frontier.seen_count(),
            pages = self.stats.pages_crawled,
            skipped = self.stats.pages_skipped,
            pdfs = self.stats.pdfs_found,
            limit_reached = self.stats.limit_reached,
            cancelled = self.stats.cancelled,
            "crawl finished"
        );
        Ok(self.stats)
    }

    async fn effective_delay(&mut self, start: &Url) -> Duration {
        let requested = self
            .robots
            .crawl_delay(start)
            .await
            .map(|d| d.min(MAX_CRAWL_DELAY))
            .unwrap_or_default();
        self.settings.politeness_delay.max(requested)
    }

    /// Fetches the start page; failing to reach it aborts the crawl
    async fn crawl_start_page(&mut self, start: &Url) -> Result<(), AuditError> {
        self.frontier.mark_seen(start);

        if !self.robots.is_allowed(start).await {
            return Err(AuditError::StartUnreachable {
                url: start.to_string(),
                reason: "disallowed by robots.txt".to_string(),
            });
        }

        self.stats.page_fetches += 1;
        let result = fetch_page(&self.client, start, self.settings.page_timeout, &self.scope).await;

        match result {
            FetchResult::HttpError { .. }
            | FetchResult::NetworkError { .. }
            | FetchResult::OutOfScope { .. } => {
                Err(AuditError::StartUnreachable {
                    url: start.to_string(),
                    reason: result.skip_reason().unwrap_or_default(),
                })
            }
            other => {
                let target = CrawlTarget {
                    url: start.clone(),
                    depth: 0,
                    origin_url: None,
                };
                self.handle_fetch(target, other).await;
                Ok(())
            }
        }
    }

    async fn seed_from_sitemap(&mut self, start: &Url) {
        let pdfs = fetch_sitemap_pdfs(&self.client, start, self.settings.page_timeout).await;
        for url in pdfs {
            if self.scope.allows(&url) && self.frontier.admit_pdf(&url) {
                self.stats.pdfs_found += 1;
                self.emit(CrawlEvent::PdfFound {
                    url,
                    depth: 0,
                    found_on: None,
                })
                .await;
            }
        }
    }

    /// Starts page fetches until the fetch limit, the concurrency limit or
    /// the frontier runs out
    async fn dispatch(
        &mut self,
        semaphore: &Arc<Semaphore>,
        tasks: &mut JoinSet<(CrawlTarget, FetchResult)>,
        delay: Duration,
    ) {
        while !self.is_cancelled() {
            if self.stats.page_fetches >= u64::from(self.settings.max_pages) {
                let dropped = self.frontier.clear_pending();
                if dropped > 0 {
                    self.stats.limit_reached = true;
                    tracing::info!(dropped, "page limit reached, no further pages queued");
                }
                return;
            }

            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                return;
            };
            let Some(target) = self.frontier.pop() else {
                return;
            };

            if !self.robots.is_allowed(&target.url).await {
                self.skip(&target, "disallowed by robots.txt".to_string()).await;
                continue;
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            self.stats.page_fetches += 1;
            tracing::debug!(url = %target.url, depth = target.depth, "fetching page");

            let client = self.client.clone();
            let scope = self.scope.clone();
            let timeout = self.settings.page_timeout;
            tasks.spawn(async move {
                let result = fetch_page(&client, &target.url, timeout, &scope).await;
                drop(permit);
                (target, result)
            });
        }
    }

    /// Processes one fetch result; returns false once the consumer is gone
    async fn handle_fetch(&mut self, target: CrawlTarget, result: FetchResult) -> bool {
        match result {
            FetchResult::Html { final_url, body } => {
                let links = parse_html(&body, &final_url).links;
                self.stats.pages_crawled += 1;
                let link_count = links.len();
                self.handle_links(&target, links).await;
                self.emit(CrawlEvent::PageCrawled {
                    url: target.url,
                    depth: target.depth,
                    links: link_count,
                })
                .await
            }
            FetchResult::Pdf { .. } => {
                self.stats.pages_crawled += 1;
                if self.scope.allows(&target.url) && self.frontier.admit_pdf(&target.url) {
                    self.stats.pdfs_found += 1;
                    return self
                        .emit(CrawlEvent::PdfFound {
                            url: target.url,
                            depth: target.depth,
                            found_on: target.origin_url,
                        })
                        .await;
                }
                true
            }
            other => {
                let reason = other.skip_reason().unwrap_or_default();
                self.skip(&target, reason).await
            }
        }
    }

    async fn handle_links(&mut self, page: &CrawlTarget, links: Vec<Url>) {
        for link in links {
            let Ok(url) = normalize_parsed(link) else {
                continue;
            };

            if !self.scope.allows(&url) {
                tracing::trace!(url = %url, "out of scope");
                continue;
            }

            match classify_link(&url) {
                LinkKind::Pdf => {
                    if self.frontier.admit_pdf(&url) {
                        self.stats.pdfs_found += 1;
                        tracing::debug!(url = %url, page = %page.url, "pdf found");
                        self.emit(CrawlEvent::PdfFound {
                            url,
                            depth: page.depth + 1,
                            found_on: Some(page.url.clone()),
                        })
                        .await;
                    }
                }
                LinkKind::Page if page.depth < self.settings.max_depth => {
                    self.frontier.push(CrawlTarget {
                        url,
                        depth: page.depth + 1,
                        origin_url: Some(page.url.clone()),
                    });
                }
                LinkKind::Page | LinkKind::Media => {}
            }
        }
    }

    async fn skip(&mut self, target: &CrawlTarget, reason: String) -> bool {
        tracing::warn!(url = %target.url, reason = %reason, "page skipped");
        self.stats.pages_skipped += 1;
        self.emit(CrawlEvent::PageSkipped {
            url: target.url.clone(),
            depth: target.depth,
            reason,
        })
        .await
    }

    /// Sends an event; a closed channel means nobody is listening anymore
    async fn emit(&self, event: CrawlEvent) -> bool {
        if self.events.send(event).await.is_err() {
            self.cancel.store(true, Ordering::SeqCst);
            return false;
        }
        true
    }
}
