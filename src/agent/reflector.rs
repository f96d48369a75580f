//! Reflection agent: judges whether the evidence so far answers the topic.

use async_trait::async_trait;

use super::config::AgentConfig;
use super::gateway::LlmGateway;
use super::prompt::{PromptSet, build_reflection_prompt, render};
use super::schema::Reflection;
use super::traits::Agent;
use crate::error::AgentError;

/// Agent that decides between another evidence round and finalizing.
pub struct ReflectionAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl ReflectionAgent {
    /// Creates a reflection agent.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet, current_date: &str) -> Self {
        Self {
            model: config.reflection_model.clone(),
            max_tokens: config.planning_max_tokens,
            system_prompt: render(&prompts.reflection, &[("current_date", current_date)]),
        }
    }

    /// Reflects on `summaries`, the evidence of every round so far.
    ///
    /// # Errors
    ///
    /// Propagates gateway errors.
    pub async fn reflect(
        &self,
        gateway: &LlmGateway,
        topic: &str,
        summaries: &str,
    ) -> Result<Reflection, AgentError> {
        self.execute_structured(gateway, &build_reflection_prompt(topic, summaries))
            .await
    }
}

#[async_trait]
impl Agent for ReflectionAgent {
    fn name(&self) -> &'static str {
        "reflection"
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
            .reflection_model("reflect-model")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let agent = ReflectionAgent::new(&config, &PromptSet::defaults(), "June 02, 2026");
        assert_eq!(agent.name(), "reflection");
        assert_eq!(agent.model(), "reflect-model");
        assert_eq!(agent.max_tokens(), config.planning_max_tokens);
        assert!(!agent.system_prompt().contains("{current_date}"));
    }
}
