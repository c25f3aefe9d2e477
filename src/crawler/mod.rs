//! Crawler module for PDF discovery
//!
//! This module contains the crawling logic, including:
//! - The deduplicated breadth-first frontier
//! - HTTP fetching with Content-Type classification
//! - HTML parsing and link extraction
//! - Sitemap seeding
//! - The crawl engine that ties them together and streams events

mod engine;
mod fetcher;
mod frontier;
mod parser;
mod sitemap;

pub use engine::{CrawlEvent, CrawlSettings, CrawlStats, Crawler};
pub use fetcher::{build_http_client, fetch_page, FetchResult};
pub use frontier::{CrawlTarget, Frontier};
pub use parser::{parse_html, ParsedPage};
pub use sitemap::{fetch_sitemap_pdfs, parse_sitemap};
