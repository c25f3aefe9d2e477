//! Sitemap seeding
//!
//! Sites often list their documents in a sitemap without linking every one
//! from a page. PDFs found there are emitted before the page traversal starts.

use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

/// Sitemap locations probed on the start origin
const SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml"];

/// Extracts every `<loc>` entry of a sitemap document
pub fn parse_sitemap(xml: &str) -> Vec<String> {
    let document = Html::parse_document(xml);
    let Ok(selector) = Selector::parse("loc") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|loc| !loc.is_empty())
        .collect()
}

/// Fetches the start origin's sitemaps and returns the PDF URLs they list
///
/// Missing or unreadable sitemaps are not an error; they simply contribute
/// nothing.
pub async fn fetch_sitemap_pdfs(
    client: &reqwest::Client,
    start: &Url,
    timeout: Duration,
) -> Vec<Url> {
    let mut pdfs = Vec::new();

    for path in SITEMAP_PATHS {
        let Ok(sitemap_url) = start.join(path) else {
            continue;
        };

        let response = match client.get(sitemap_url.clone()).timeout(timeout).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(url = %sitemap_url, status = %r.status(), "no sitemap");
                continue;
            }
            Err(e) => {
                tracing::debug!(url = %sitemap_url, error = %e, "sitemap fetch failed");
                continue;
            }
        };

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(url = %sitemap_url, error = %e, "sitemap body unreadable");
                continue;
            }
        };

        let found: Vec<Url> = parse_sitemap(&body)
            .into_iter()
            .filter(|loc| loc.to_lowercase().ends_with(".pdf"))
            .filter_map(|loc| crate::url::normalize_url(&loc).ok())
            .collect();

        tracing::info!(url = %sitemap_url, pdfs = found.len(), "sitemap found");
        pdfs.extend(found);
    }

    pdfs
}
