//! Web search adapter backed by the Exa search API.
//!
//! Each sub-query is sent to `{base}/search`; hits get citation tokens and
//! are condensed into a cited note by the query model. When condensing
//! fails the hits are returned as a raw digest that still carries tokens.

use std::fmt::Write;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{DispatchContext, EvidenceItem, EvidenceSource};
use crate::agent::citation::SourceRecord;
use crate::agent::config::AgentConfig;
use crate::agent::gateway::LlmGateway;
use crate::agent::message::{ChatRequest, system_message, user_message};
use crate::agent::prompt::{PromptSet, ResultContext, build_web_summary_prompt, render};
use crate::error::AgentError;

const SOURCE_NAME: &str = "web";
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
/// Characters of page text shown to the summarizer per hit.
const RESULT_TEXT_LIMIT: usize = 4000;
/// Characters kept as a source snippet.
const SNIPPET_LIMIT: usize = 300;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    num_results: usize,
    #[serde(rename = "type")]
    search_type: &'static str,
    contents: ContentsOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentsOptions {
    text: bool,
    highlights: HighlightOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HighlightOptions {
    num_sentences: u32,
    highlights_per_url: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    url: String,
    title: Option<String>,
    published_date: Option<String>,
    text: Option<String>,
    #[serde(default)]
    highlights: Vec<String>,
}

impl SearchHit {
    fn label(&self) -> &str {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.url)
    }

    fn body(&self) -> String {
        match self.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => truncate_chars(text, RESULT_TEXT_LIMIT),
            _ => self.highlights.join(" "),
        }
    }
}

/// Internet search through the Exa API.
pub struct WebSearchSource {
    client: Client,
    api_key: String,
    endpoint: String,
    num_results: usize,
    gateway: LlmGateway,
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl std::fmt::Debug for WebSearchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchSource")
            .field("endpoint", &self.endpoint)
            .field("num_results", &self.num_results)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl WebSearchSource {
    /// Creates the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidConfig`] without a search API key, or
    /// when the HTTP client cannot be built.
    pub fn new(
        config: &AgentConfig,
        gateway: LlmGateway,
        prompts: &PromptSet,
    ) -> Result<Self, AgentError> {
        let api_key = config
            .search_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AgentError::InvalidConfig {
                message: "web search requires a search API key (SCOUT_SEARCH_API_KEY)"
                    .to_string(),
            })?
            .to_string();

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AgentError::InvalidConfig {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/search", config.search_base_url.trim_end_matches('/')),
            num_results: config.search_results,
            gateway,
            model: config.query_model.clone(),
            max_tokens: config.answer_max_tokens,
            system_prompt: prompts.web_summarizer.clone(),
        })
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch(&self, query: &str) -> Result<Vec<SearchHit>, AgentError> {
        let request = SearchRequest {
            query,
            num_results: self.num_results,
            search_type: "auto",
            contents: ContentsOptions {
                text: true,
                highlights: HighlightOptions {
                    num_sentences: 3,
                    highlights_per_url: 2,
                },
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| evidence_error(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(evidence_error(format!(
                "search API error ({status}): {}",
                truncate_chars(&body, 200)
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| evidence_error(format!("failed to parse search response: {e}")))?;
        Ok(parsed.results)
    }

    async fn summarize(
        &self,
        query: &str,
        hits: &[SearchHit],
        records: &[SourceRecord],
        current_date: &str,
    ) -> Result<String, AgentError> {
        let bodies: Vec<String> = hits.iter().map(SearchHit::body).collect();
        let contexts: Vec<ResultContext<'_>> = hits
            .iter()
            .zip(records)
            .zip(&bodies)
            .map(|((hit, record), body)| ResultContext {
                token: &record.short_token,
                title: hit.label(),
                published: hit.published_date.as_deref(),
                text: body,
            })
            .collect();

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                system_message(&render(
                    &self.system_prompt,
                    &[("current_date", current_date)],
                )),
                user_message(&build_web_summary_prompt(query, &contexts)),
            ],
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            json_mode: false,
            response_schema: None,
        };
        self.gateway.invoke_text(request).await
    }
}

#[async_trait]
impl EvidenceSource for WebSearchSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn search(
        &self,
        query: &str,
        ctx: &mut DispatchContext,
    ) -> Result<Vec<EvidenceItem>, AgentError> {
        let hits = self.fetch(query).await?;
        if hits.is_empty() {
            return Ok(vec![EvidenceItem::note(format!(
                "No results found for query: {query}"
            ))]);
        }

        let records: Vec<SourceRecord> = hits
            .iter()
            .map(|hit| {
                ctx.allocator
                    .allocate(&hit.url, hit.label(), &truncate_chars(&hit.body(), SNIPPET_LIMIT))
            })
            .collect();
        debug!(
            dispatch_id = ctx.dispatch_id(),
            hits = hits.len(),
            "Web search returned results"
        );

        let text = match self
            .summarize(query, &hits, &records, &ctx.current_date)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!(
                    dispatch_id = ctx.dispatch_id(),
                    error = %e,
                    "Summarizing web results failed; using raw digest"
                );
                raw_digest(&hits, &records)
            }
        };

        let mut sources = Vec::with_capacity(records.len());
        for record in records {
            if !sources
                .iter()
                .any(|s: &SourceRecord| s.short_token == record.short_token)
            {
                sources.push(record);
            }
        }
        Ok(vec![EvidenceItem { text, sources }])
    }
}

/// Lists each hit with its citation link and a short excerpt.
fn raw_digest(hits: &[SearchHit], records: &[SourceRecord]) -> String {
    let mut digest = String::new();
    for (hit, record) in hits.iter().zip(records) {
        let _ = writeln!(
            digest,
            "- [{}]({}): {}",
            hit.label(),
            record.short_token,
            truncate_chars(&hit.body(), SNIPPET_LIMIT)
        );
    }
    digest.trim_end().to_string()
}

fn evidence_error(message: String) -> AgentError {
    AgentError::Evidence {
        source_name: SOURCE_NAME.to_string(),
        message,
    }
}

/// First `limit` characters of `text`, with `...` when cut.
fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
