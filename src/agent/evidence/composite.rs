//! Runs several evidence sources in order for one sub-query.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{DispatchContext, EvidenceItem, EvidenceSource};
use crate::error::AgentError;

/// Consults each inner source in turn and concatenates their evidence.
///
/// A failing inner source contributes a note instead of failing the
/// dispatch, so the others still count.
pub struct CompositeSource {
    sources: Vec<Arc<dyn EvidenceSource>>,
}

impl CompositeSource {
    /// Creates a composite over `sources`, consulted in order.
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn EvidenceSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl EvidenceSource for CompositeSource {
    fn name(&self) -> &'static str {
        "composite"
    }

    async fn search(
        &self,
        query: &str,
        ctx: &mut DispatchContext,
    ) -> Result<Vec<EvidenceItem>, AgentError> {
        let mut items = Vec::new();
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.search(query, ctx).await {
                Ok(found) => items.extend(found),
                Err(e) => {
                    warn!(source = source.name(), query, error = %e, "Evidence source failed");
                    items.push(EvidenceItem::note(format!(
                        "{} search failed for query \"{query}\": {e}",
                        source.name()
                    )));
                    failures.push(e.to_string());
                }
            }
        }
        if !self.sources.is_empty() && failures.len() == self.sources.len() {
            return Err(AgentError::Evidence {
                source_name: self.name().to_string(),
                message: format!("every source failed: {}", failures.join("; ")),
            });
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::evidence::gather;
    use crate::agent::evidence::tests::FakeSource;

    struct Broken;

    #[async_trait]
    impl EvidenceSource for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn search(
            &self,
            _query: &str,
            _ctx: &mut DispatchContext,
        ) -> Result<Vec<EvidenceItem>, AgentError> {
            Err(AgentError::Evidence {
                source_name: "broken".to_string(),
                message: "down".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_sources_share_allocator_and_absorb_errors() {
        let composite = CompositeSource::new(vec![
            Arc::new(FakeSource),
            Arc::new(Broken),
            Arc::new(FakeSource),
        ]);
        let mut ctx = DispatchContext::new(1, Arc::from("t"), Arc::from("d"));
        let items = composite
            .search("q|alpha", &mut ctx)
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(items.len(), 3);
        assert!(items[1].text.starts_with("broken search failed"));
        // Same origin from both fake sources resolves to one token.
        assert_eq!(items[0].sources[0].short_token, "cite://1-1");
        assert_eq!(items[2].sources[0].short_token, "cite://1-1");
    }

    #[tokio::test]
    async fn test_all_sources_failing_marks_dispatch_failed() {
        let composite = CompositeSource::new(vec![Arc::new(Broken), Arc::new(Broken)]);
        let ctx = DispatchContext::new(4, Arc::from("t"), Arc::from("d"));
        let result = gather(&composite, "q", ctx).await;

        assert!(result.failure.is_some());
        assert!(result.sources.is_empty());
        assert!(result.text.contains("every source failed"));
    }
}
