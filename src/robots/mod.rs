//! Robots.txt handling module
//!
//! Each origin's robots.txt is fetched at most once per job and kept in a
//! job-local cache. Pages it disallows are skipped; its `Crawl-delay` raises
//! the politeness delay between page fetches.

mod parser;

pub use parser::ParsedRobots;

use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Fetches robots.txt for the origin of `url`
///
/// Anything but a successful response (404, 5xx, network error) is treated
/// as "no rules".
pub async fn fetch_robots(client: &Client, url: &Url, timeout: Duration) -> ParsedRobots {
    let Ok(robots_url) = url.join("/robots.txt") else {
        return ParsedRobots::allow_all();
    };

    match client.get(robots_url.clone()).timeout(timeout).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(body) => ParsedRobots::from_content(&body),
            Err(e) => {
                tracing::warn!(url = %robots_url, error = %e, "unreadable robots.txt, allowing all");
                ParsedRobots::allow_all()
            }
        },
        Ok(response) => {
            tracing::debug!(url = %robots_url, status = %response.status(), "no robots.txt");
            ParsedRobots::allow_all()
        }
        Err(e) => {
            tracing::warn!(url = %robots_url, error = %e, "robots.txt fetch failed, allowing all");
            ParsedRobots::allow_all()
        }
    }
}

/// Per-job robots.txt cache keyed by origin
#[derive(Debug)]
pub struct RobotsCache {
    client: Client,
    agent: String,
    timeout: Duration,
    enabled: bool,
    entries: HashMap<String, ParsedRobots>,
}

impl RobotsCache {
    /// Creates a cache; with `enabled` off every URL is allowed and nothing is fetched
    pub fn new(client: Client, agent: impl Into<String>, timeout: Duration, enabled: bool) -> Self {
        Self {
            client,
            agent: agent.into(),
            timeout,
            enabled,
            entries: HashMap::new(),
        }
    }

    async fn rules_for(&mut self, url: &Url) -> Option<&ParsedRobots> {
        if !self.enabled {
            return None;
        }
        let key = url.origin().ascii_serialization();
        if !self.entries.contains_key(&key) {
            let robots = fetch_robots(&self.client, url, self.timeout).await;
            self.entries.insert(key.clone(), robots);
        }
        self.entries.get(&key)
    }

    /// Checks `url` against its origin's robots.txt
    pub async fn is_allowed(&mut self, url: &Url) -> bool {
        let agent = self.agent.clone();
        match self.rules_for(url).await {
            Some(robots) => robots.is_allowed(url.as_str(), &agent),
            None => true,
        }
    }

    /// Crawl delay requested by the origin of `url`, if any
    pub async fn crawl_delay(&mut self, url: &Url) -> Option<Duration> {
        let agent = self.agent.clone();
        self.rules_for(url).await?.crawl_delay(&agent)
    }

    /// Number of origins whose robots.txt has been fetched
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
