//! Query writer agent: turns the research topic into search sub-queries.

use async_trait::async_trait;

use super::config::AgentConfig;
use super::gateway::LlmGateway;
use super::prompt::{PromptSet, build_query_prompt, render};
use super::schema::{SearchQueryList, usable_queries};
use super::traits::Agent;
use crate::error::AgentError;

/// Agent that plans the first round of searches.
pub struct QueryWriterAgent {
    model: String,
    max_tokens: u32,
    number_queries: usize,
    system_prompt: String,
}

impl QueryWriterAgent {
    /// Creates a query writer asking for at most `number_queries` queries.
    #[must_use]
    pub fn new(
        config: &AgentConfig,
        prompts: &PromptSet,
        current_date: &str,
        number_queries: usize,
    ) -> Self {
        let count = number_queries.to_string();
        Self {
            model: config.query_model.clone(),
            max_tokens: config.planning_max_tokens,
            number_queries,
            system_prompt: render(
                &prompts.query_writer,
                &[("number_queries", &count), ("current_date", current_date)],
            ),
        }
    }

    /// Generates sub-queries for `topic`.
    ///
    /// The returned list is trimmed, deduplicated and capped, and may be
    /// empty when the model produced nothing usable.
    ///
    /// # Errors
    ///
    /// Propagates gateway errors.
    pub async fn generate(
        &self,
        gateway: &LlmGateway,
        topic: &str,
    ) -> Result<SearchQueryList, AgentError> {
        let prompt = build_query_prompt(topic, self.number_queries);
        let raw: SearchQueryList = self.execute_structured(gateway, &prompt).await?;
        Ok(SearchQueryList {
            query: usable_queries(raw.query, self.number_queries),
            rationale: raw.rationale,
        })
    }
}

#[async_trait]
impl Agent for QueryWriterAgent {
    fn name(&self) -> &'static str {
        "query_writer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        1.0
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_properties() {
        let config = AgentConfig::builder()
            .api_key("test")
            .query_model("query-model")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let agent = QueryWriterAgent::new(&config, &PromptSet::defaults(), "June 02, 2026", 4);
        assert_eq!(agent.name(), "query_writer");
        assert_eq!(agent.model(), "query-model");
        assert!((agent.temperature() - 1.0).abs() < f32::EPSILON);
        assert!(agent.system_prompt().contains("more than 4 queries"));
        assert!(agent.system_prompt().contains("June 02, 2026"));
    }
}
