//! Deduplicated breadth-first work queue of one crawl

use std::collections::{HashSet, VecDeque};
use url::Url;

/// A page waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    /// Normalized URL of the page
    pub url: Url,

    /// Link distance from the start URL
    pub depth: u32,

    /// Page the link was found on (None for the start URL)
    pub origin_url: Option<Url>,
}

/// URL frontier
///
/// Every page URL and every PDF URL is admitted at most once per crawl.
/// Admission is a single check-and-insert on the `seen` set, so a URL
/// discovered from two pages is still queued only once.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<CrawlTarget>,
    seen: HashSet<String>,
    pdfs: HashSet<String>,
    dispatched: u64,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a page unless it was seen before; returns true if queued
    pub fn push(&mut self, target: CrawlTarget) -> bool {
        if !self.seen.insert(target.url.as_str().to_string()) {
            return false;
        }
        self.queue.push_back(target);
        true
    }

    /// Records a PDF URL; returns true the first time it is seen
    pub fn admit_pdf(&mut self, url: &Url) -> bool {
        self.pdfs.insert(url.as_str().to_string())
    }

    /// Records a page URL without queuing it (e.g. a page that answered with a PDF)
    pub fn mark_seen(&mut self, url: &Url) -> bool {
        self.seen.insert(url.as_str().to_string())
    }

    /// Takes the next page in breadth-first order
    pub fn pop(&mut self) -> Option<CrawlTarget> {
        let target = self.queue.pop_front()?;
        self.dispatched += 1;
        Some(target)
    }

    /// Drops everything still queued; used once a limit is reached
    pub fn clear_pending(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of pages handed out for fetching
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Number of distinct page URLs ever admitted
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn pdf_count(&self) -> usize {
        self.pdfs.len()
    }
}
