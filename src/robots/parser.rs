//! Robots.txt parser implementation
//!
//! Allow/disallow matching is delegated to the robotstxt crate; the
//! `Crawl-delay` extension is read here since the crate ignores it.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Parsed robots.txt of one origin
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content; empty means allow all
    content: String,
}

impl ParsedRobots {
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Permissive rules, used when robots.txt is missing or cannot be fetched
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
        }
    }

    /// Checks if a URL is allowed for the given product token
    ///
    /// `url` may be absolute or a path; the matcher only looks at path and query.
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        if self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, agent, url)
    }

    /// Gets the crawl delay that applies to `agent`
    ///
    /// `agent` is a product token such as `PdfAuditBot`. A group naming the
    /// token (case-insensitively) wins over the `*` group. Consecutive
    /// `User-agent` lines share one group.
    pub fn crawl_delay(&self, agent: &str) -> Option<Duration> {
        let agent = product_token(agent).to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut specific = None;
        let mut wildcard = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                if !in_agent_lines {
                    group.clear();
                }
                group.push(product_token(value).to_lowercase());
                in_agent_lines = true;
                continue;
            }
            in_agent_lines = false;

            if key != "crawl-delay" {
                continue;
            }
            let Ok(secs) = value.parse::<f64>() else {
                continue;
            };
            if !secs.is_finite() || secs < 0.0 {
                continue;
            }

            if group.iter().any(|ua| ua != "*" && *ua == agent) {
                specific = Some(secs);
            } else if group.iter().any(|ua| ua == "*") {
                wildcard = Some(secs);
            }
        }

        specific.or(wildcard).map(Duration::from_secs_f64)
    }
}

/// Leading `[A-Za-z_-]` run of a user agent, e.g. `PdfAuditBot` in `PdfAuditBot/1.0`
fn product_token(agent: &str) -> &str {
    let agent = agent.trim();
    let end = agent
        .find(|c: char| !(c.is_ascii_alphabetic() || c == '-' || c == '_'))
        .unwrap_or(agent.len());
    if end == 0 {
        agent
    } else {
        &agent[..end]
    }
}
