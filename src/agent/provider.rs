//! Pluggable LLM provider trait.
//!
//! Implementations translate provider-agnostic [`ChatRequest`]/[`ChatResponse`]
//! into provider-specific SDK calls. Retries, timeouts and model fallback
//! live one level up in [`LlmGateway`](super::gateway::LlmGateway), so a
//! provider performs exactly one attempt per call.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// Trait for LLM provider backends.
///
/// Implementations must be safe to call concurrently: one provider is
/// shared by every evidence dispatch of every in-flight request.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`, `"ollama"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] classified as recoverable (rate limit,
    /// transient network, 5xx) or fatal (authentication, bad request).
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;
}
