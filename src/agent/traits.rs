//! Agent trait definition.
//!
//! Each research role (query writer, reflector, synthesizer) implements
//! this trait, which fixes its model, system prompt and sampling settings
//! and routes every call through the [`LlmGateway`].

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use super::gateway::LlmGateway;
use super::message::{ChatRequest, system_message, user_message};
use crate::error::AgentError;

/// Trait implemented by all agents in the system.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's role and behavior.
    fn system_prompt(&self) -> &str;

    /// Sampling temperature (0.0 = deterministic, higher = more creative).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        2048
    }

    /// Builds the chat request for `user_msg`.
    fn request(&self, user_msg: &str) -> ChatRequest {
        ChatRequest {
            model: self.model().to_string(),
            messages: vec![system_message(self.system_prompt()), user_message(user_msg)],
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            json_mode: false,
            response_schema: None,
        }
    }

    /// Free-text call.
    ///
    /// # Errors
    ///
    /// Propagates gateway errors.
    async fn execute(&self, gateway: &LlmGateway, user_msg: &str) -> Result<String, AgentError> {
        gateway.invoke_text(self.request(user_msg)).await
    }

    /// Structured call decoded into `T`.
    ///
    /// # Errors
    ///
    /// Propagates gateway errors, including exhausted malformed output.
    async fn execute_structured<T>(
        &self,
        gateway: &LlmGateway,
        user_msg: &str,
    ) -> Result<T, AgentError>
    where
        T: DeserializeOwned + JsonSchema + Send + 'static,
        Self: Sized,
    {
        gateway.invoke_structured::<T>(self.request(user_msg)).await
    }
}
