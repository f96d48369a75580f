//! Synthesizer agent: writes the final cited answer.
//!
//! Receives the evidence of every round and answers the topic, citing
//! sources with the short tokens already present in the evidence.

use async_trait::async_trait;

use super::config::AgentConfig;
use super::gateway::LlmGateway;
use super::prompt::{PromptSet, build_answer_prompt, render};
use super::traits::Agent;
use crate::error::AgentError;

/// Agent that synthesizes the evidence log into an answer.
pub struct SynthesizerAgent {
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl SynthesizerAgent {
    /// Creates a synthesizer agent.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet, current_date: &str) -> Self {
        Self {
            model: config.answer_model.clone(),
            max_tokens: config.answer_max_tokens,
            system_prompt: render(&prompts.answer, &[("current_date", current_date)]),
        }
    }

    /// Writes the answer. Citation tokens are left unresolved.
    ///
    /// # Errors
    ///
    /// Propagates gateway errors.
    pub async fn synthesize(
        &self,
        gateway: &LlmGateway,
        topic: &str,
        summaries: &str,
    ) -> Result<String, AgentError> {
        self.execute(gateway, &build_answer_prompt(topic, summaries))
            .await
    }
}

#[async_trait]
impl Agent for SynthesizerAgent {
    fn name(&self) -> &'static str {
        "synthesizer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
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
            .answer_model("answer-model")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let agent = SynthesizerAgent::new(&config, &PromptSet::defaults(), "June 02, 2026");
        assert_eq!(agent.name(), "synthesizer");
        assert_eq!(agent.model(), "answer-model");
        assert!((agent.temperature() - 0.0).abs() < f32::EPSILON);
        assert_eq!(agent.max_tokens(), config.answer_max_tokens);
    }
}
