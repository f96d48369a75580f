//! Evidence sources: one sub-query in, evidence items with sources out.
//!
//! Adapters implement [`EvidenceSource`] and may fail freely; the research
//! loop only ever calls them through [`gather`], which turns every error
//! into a placeholder item with no sources so a dispatch always yields a
//! value.

pub mod composite;
#[cfg(feature = "database")]
pub mod database;
pub mod local;
pub mod web;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::citation::{SourceRecord, TokenAllocator};
use super::config::{AgentConfig, SearchMode};
use super::gateway::LlmGateway;
use super::prompt::PromptSet;
use crate::error::AgentError;

pub use composite::CompositeSource;
#[cfg(feature = "database")]
pub use database::DatabaseSource;
pub use local::LocalNetworkSource;
pub use web::WebSearchSource;

/// A piece of evidence and the sources it cites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceItem {
    /// Evidence text, citing sources by short token.
    pub text: String,
    /// Sources referenced by `text`.
    pub sources: Vec<SourceRecord>,
}

impl EvidenceItem {
    /// Item with no sources.
    #[must_use]
    pub fn note(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: Vec::new(),
        }
    }
}

/// Per-dispatch context handed to adapters.
#[derive(Debug)]
pub struct DispatchContext {
    /// Research topic of the enclosing request.
    pub topic: Arc<str>,
    /// Current date, as injected into prompts.
    pub current_date: Arc<str>,
    /// Token allocator for this dispatch.
    pub allocator: TokenAllocator,
}

impl DispatchContext {
    /// Context for `dispatch_id`.
    #[must_use]
    pub fn new(dispatch_id: u64, topic: Arc<str>, current_date: Arc<str>) -> Self {
        Self {
            topic,
            current_date,
            allocator: TokenAllocator::new(dispatch_id),
        }
    }

    /// Dispatch id.
    #[must_use]
    pub const fn dispatch_id(&self) -> u64 {
        self.allocator.dispatch_id()
    }
}

/// A backend that answers one sub-query with evidence.
///
/// Implementations are shared across concurrent dispatches and requests.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    /// Adapter name for logging.
    fn name(&self) -> &'static str;

    /// Searches for `query`.
    ///
    /// Sources must be allocated through `ctx.allocator` so their tokens
    /// are unique within the request.
    ///
    /// # Errors
    ///
    /// Any failure. Callers go through [`gather`], which absorbs it.
    async fn search(
        &self,
        query: &str,
        ctx: &mut DispatchContext,
    ) -> Result<Vec<EvidenceItem>, AgentError>;
}

/// What one dispatch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    /// Dispatch id.
    pub dispatch_id: u64,
    /// Sub-query searched.
    pub query: String,
    /// Evidence text, items joined in order.
    pub text: String,
    /// Sources cited by `text`.
    pub sources: Vec<SourceRecord>,
    /// Why the dispatch degraded, if it did.
    pub failure: Option<String>,
}

impl DispatchResult {
    /// Placeholder for a dispatch that produced nothing usable.
    #[must_use]
    pub fn placeholder(dispatch_id: u64, query: &str, reason: &str) -> Self {
        Self {
            dispatch_id,
            query: query.to_string(),
            text: format!("Evidence gathering failed for query \"{query}\": {reason}"),
            sources: Vec::new(),
            failure: Some(reason.to_string()),
        }
    }
}

/// Runs `source` for one dispatch. Never fails.
///
/// Errors degrade to [`DispatchResult::placeholder`]; an empty result
/// becomes an explanatory note.
pub async fn gather(
    source: &dyn EvidenceSource,
    query: &str,
    mut ctx: DispatchContext,
) -> DispatchResult {
    let dispatch_id = ctx.dispatch_id();
    match source.search(query, &mut ctx).await {
        Ok(items) if items.is_empty() => {
            debug!(dispatch_id, source = source.name(), query, "No evidence returned");
            DispatchResult {
                dispatch_id,
                query: query.to_string(),
                text: format!("No evidence found for query: {query}"),
                sources: Vec::new(),
                failure: None,
            }
        }
        Ok(items) => {
            debug!(
                dispatch_id,
                source = source.name(),
                items = items.len(),
                "Evidence gathered"
            );
            let text = items
                .iter()
                .map(|item| item.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            let mut sources: Vec<SourceRecord> = Vec::new();
            for source in items.into_iter().flat_map(|item| item.sources) {
                if !sources.iter().any(|s| s.short_token == source.short_token) {
                    sources.push(source);
                }
            }
            DispatchResult {
                dispatch_id,
                query: query.to_string(),
                text,
                sources,
                failure: None,
            }
        }
        Err(e) => {
            warn!(
                dispatch_id,
                source = source.name(),
                query,
                error = %e,
                "Evidence dispatch failed; substituting placeholder"
            );
            DispatchResult::placeholder(dispatch_id, query, &e.to_string())
        }
    }
}

/// Builds the evidence source for the configured search mode.
///
/// # Errors
///
/// Returns [`AgentError::InvalidConfig`] when the mode needs settings that
/// are missing: a web search key, or a database path (or the `database`
/// feature).
pub fn build_source(
    config: &AgentConfig,
    gateway: &LlmGateway,
    prompts: &PromptSet,
) -> Result<Arc<dyn EvidenceSource>, AgentError> {
    let web = || -> Result<Arc<dyn EvidenceSource>, AgentError> {
        Ok(Arc::new(WebSearchSource::new(config, gateway.clone(), prompts)?))
    };
    let local = || -> Result<Arc<dyn EvidenceSource>, AgentError> {
        Ok(Arc::new(LocalNetworkSource::new(config)?))
    };

    match config.search_mode {
        SearchMode::InternetOnly => web(),
        SearchMode::LocalOnly => local(),
        SearchMode::InternetThenLocal => {
            Ok(Arc::new(CompositeSource::new(vec![web()?, local()?])))
        }
        SearchMode::LocalThenInternet => {
            Ok(Arc::new(CompositeSource::new(vec![local()?, web()?])))
        }
        SearchMode::Database => database_source(config, gateway, prompts),
    }
}

#[cfg(feature = "database")]
fn database_source(
    config: &AgentConfig,
    gateway: &LlmGateway,
    prompts: &PromptSet,
) -> Result<Arc<dyn EvidenceSource>, AgentError> {
    Ok(Arc::new(DatabaseSource::new(config, gateway.clone(), prompts)?))
}

#[cfg(not(feature = "database"))]
fn database_source(
    _config: &AgentConfig,
    _gateway: &LlmGateway,
    _prompts: &PromptSet,
) -> Result<Arc<dyn EvidenceSource>, AgentError> {
    Err(AgentError::InvalidConfig {
        message: "search mode 'database' requires the 'database' feature".to_string(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Scripted source: fails for queries containing `fail`, otherwise
    /// cites one origin per comma-separated word of the query suffix
    /// after `|`.
    pub(crate) struct FakeSource;

    #[async_trait]
    impl EvidenceSource for FakeSource {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn search(
            &self,
            query: &str,
            ctx: &mut DispatchContext,
        ) -> Result<Vec<EvidenceItem>, AgentError> {
            if query.contains("fail") {
                return Err(AgentError::Evidence {
                    source_name: "fake".to_string(),
                    message: "backend unreachable".to_string(),
                });
            }
            let origins = query.split_once('|').map_or("", |(_, o)| o);
            let mut items = Vec::new();
            for origin in origins.split(',').filter(|o| !o.is_empty()) {
                let record = ctx.allocator.allocate(
                    &format!("https://{origin}.example"),
                    origin,
                    "snippet",
                );
                items.push(EvidenceItem {
                    text: format!("{origin} fact [{origin}]({})", record.short_token),
                    sources: vec![record],
                });
            }
            Ok(items)
        }
    }

    fn ctx(id: u64) -> DispatchContext {
        DispatchContext::new(id, Arc::from("topic"), Arc::from("January 01, 2026"))
    }

    #[tokio::test]
    async fn test_gather_absorbs_errors() {
        let result = gather(&FakeSource, "please fail", ctx(4)).await;
        assert_eq!(result.dispatch_id, 4);
        assert!(result.sources.is_empty());
        assert!(result.failure.is_some());
        assert!(result.text.contains("please fail"));
        assert!(result.text.contains("backend unreachable"));
    }

    #[tokio::test]
    async fn test_gather_joins_items() {
        let result = gather(&FakeSource, "q|alpha,beta,alpha", ctx(2)).await;
        assert!(result.failure.is_none());
        assert_eq!(result.sources.len(), 2);
        assert_eq!(result.sources[0].short_token, "cite://2-1");
        assert_eq!(result.sources[1].short_token, "cite://2-2");
        assert_eq!(result.text.matches("cite://2-1").count(), 2);
    }

    #[tokio::test]
    async fn test_gather_empty_is_note() {
        let result = gather(&FakeSource, "nothing", ctx(0)).await;
        assert!(result.failure.is_none());
        assert_eq!(result.text, "No evidence found for query: nothing");
    }

    #[test]
    fn test_build_source_requires_search_key() {
        let config = AgentConfig::builder()
            .api_key("k")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let provider: Arc<dyn crate::agent::provider::LlmProvider> =
            Arc::new(crate::agent::testing::ScriptedProvider::new());
        let gateway = LlmGateway::new(provider, &config);
        let result = build_source(&config, &gateway, &PromptSet::default());
        assert!(matches!(result, Err(AgentError::InvalidConfig { .. })));
    }
}
