//! Local network adapter: searches pages served by configured hosts.
//!
//! Each configured domain is fetched once per sub-query. A domain without
//! a scheme is tried over `http://` and then `https://`. Pages that are not
//! HTML are skipped. A page matches when its text contains the sub-query,
//! or failing that one of its longer terms, case-insensitively.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use regex::{Regex, RegexBuilder};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use super::{DispatchContext, EvidenceItem, EvidenceSource};
use crate::agent::config::AgentConfig;
use crate::error::AgentError;

const SOURCE_NAME: &str = "local";
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
/// Graphemes kept on each side of a match.
const SNIPPET_CONTEXT: usize = 50;
/// Shortest query term worth matching on its own.
const MIN_TERM_LEN: usize = 4;

/// A page that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LocalHit {
    url: String,
    title: String,
    snippet: String,
}

/// Searches pages on the local network.
#[derive(Debug)]
pub struct LocalNetworkSource {
    client: Client,
    domains: Vec<String>,
}

impl LocalNetworkSource {
    /// Creates the adapter for the configured domains.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidConfig`] when the HTTP client cannot be
    /// built.
    pub fn new(config: &AgentConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| AgentError::InvalidConfig {
                message: format!("failed to create HTTP client: {e}"),
            })?;
        let domains = config
            .local_search_domains
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
        Ok(Self { client, domains })
    }

    /// Fetches `domain` and returns a hit when the page matches.
    async fn probe(&self, domain: &str, patterns: &[Regex]) -> Option<LocalHit> {
        for url in candidate_urls(domain) {
            let response = match self.client.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!(url = %url, error = %e, "Local fetch failed");
                    continue;
                }
            };
            if !response.status().is_success() {
                debug!(url = %url, status = %response.status(), "Local fetch not successful");
                continue;
            }
            let is_html = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.to_ascii_lowercase().contains("text/html"));
            if !is_html {
                debug!(url = %url, "Skipping non-HTML local page");
                return None;
            }
            let final_url = response.url().to_string();
            let body = match response.text().await {
                Ok(b) => b,
                Err(e) => {
                    debug!(url = %url, error = %e, "Local page body unreadable");
                    continue;
                }
            };
            return match_page(&final_url, &body, patterns);
        }
        None
    }
}

#[async_trait]
impl EvidenceSource for LocalNetworkSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn search(
        &self,
        query: &str,
        ctx: &mut DispatchContext,
    ) -> Result<Vec<EvidenceItem>, AgentError> {
        if self.domains.is_empty() {
            return Ok(vec![EvidenceItem::note(format!(
                "No local results found for '{query}' as local search is not configured."
            ))]);
        }
        let patterns = query_patterns(query);
        if patterns.is_empty() {
            return Ok(Vec::new());
        }

        let hits = join_all(self.domains.iter().map(|d| self.probe(d, &patterns))).await;
        let mut items = Vec::new();
        for hit in hits.into_iter().flatten() {
            let record = ctx.allocator.allocate(&hit.url, &hit.title, &hit.snippet);
            items.push(EvidenceItem {
                text: format!(
                    "[LOCAL] {}: {} (Source: {})",
                    hit.title, hit.snippet, record.short_token
                ),
                sources: vec![record],
            });
        }
        if items.is_empty() {
            items.push(EvidenceItem::note(format!(
                "No local results found for '{query}'."
            )));
        }
        Ok(items)
    }
}

/// URLs to try for a configured domain, in order.
fn candidate_urls(domain: &str) -> Vec<String> {
    if domain.starts_with("http://") || domain.starts_with("https://") {
        vec![domain.to_string()]
    } else {
        vec![format!("http://{domain}"), format!("https://{domain}")]
    }
}

/// Case-insensitive patterns: the whole query, then its longer terms,
/// longest first.
fn query_patterns(query: &str) -> Vec<Regex> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }
    let mut needles = vec![query.to_string()];
    let mut terms: Vec<&str> = query
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .collect();
    terms.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    for term in terms {
        if !needles.iter().any(|n| n.eq_ignore_ascii_case(term)) {
            needles.push(term.to_string());
        }
    }
    needles
        .iter()
        .filter_map(|n| {
            RegexBuilder::new(&regex::escape(n))
                .case_insensitive(true)
                .build()
                .ok()
        })
        .collect()
}

/// Extracts title and text from `html` and returns a hit on the first
/// pattern that matches.
fn match_page(url: &str, html: &str, patterns: &[Regex]) -> Option<LocalHit> {
    let document = Html::parse_document(html);
    let title = Selector::parse("title")
        .ok()
        .and_then(|s| document.select(&s).next())
        .map(|t| collapse_whitespace(&t.text().collect::<Vec<_>>().join(" ")))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.to_string());
    let text = Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next())
        .map_or_else(
            || collapse_whitespace(&document.root_element().text().collect::<Vec<_>>().join(" ")),
            |body| collapse_whitespace(&body.text().collect::<Vec<_>>().join(" ")),
        );

    let found = patterns.iter().find_map(|p| p.find(&text))?;
    Some(LocalHit {
        url: url.to_string(),
        title,
        snippet: snippet(&text, found.start(), found.end()),
    })
}

/// Window of [`SNIPPET_CONTEXT`] graphemes around `start..end`, marked
/// with `... ` and ` ...` where text was cut.
fn snippet(text: &str, start: usize, end: usize) -> String {
    let before: Vec<&str> = text[..start].graphemes(true).collect();
    let after: Vec<&str> = text[end..].graphemes(true).collect();
    let lead = &before[before.len().saturating_sub(SNIPPET_CONTEXT)..];
    let tail = &after[..after.len().min(SNIPPET_CONTEXT)];

    let mut out = String::new();
    if lead.len() < before.len() {
        out.push_str("... ");
    }
    out.push_str(lead.concat().trim_start());
    out.push_str(&text[start..end]);
    out.push_str(tail.concat().trim_end());
    if tail.len() < after.len() {
        out.push_str(" ...");
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
