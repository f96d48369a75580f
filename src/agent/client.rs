//! Provider factory.
//!
//! Maps the configured [`ProviderKind`](super::config::ProviderKind) to a
//! concrete [`LlmProvider`]. Callers only ever see the trait object, so
//! swapping backends is a configuration change.

use std::sync::Arc;

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
use crate::agent::providers::OpenAiCompatibleProvider;
use crate::error::AgentError;

/// Creates the shared [`LlmProvider`] for the configured backend.
///
/// # Supported Providers
///
/// - `openai`, `openrouter`, `deepseek`, `gemini`: hosted, key required
/// - `ollama`, `lmstudio`: local servers, key optional
///
/// # Errors
///
/// Returns [`AgentError::ApiKeyMissing`] when a hosted provider has no key.
pub fn create_provider(config: &AgentConfig) -> Result<Arc<dyn LlmProvider>, AgentError> {
    if config.provider.requires_api_key() && config.api_key.trim().is_empty() {
        return Err(AgentError::ApiKeyMissing {
            provider: config.provider.to_string(),
        });
    }
    Ok(Arc::new(OpenAiCompatibleProvider::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_openai_provider() {
        let config = AgentConfig::builder()
            .api_key("test")
            .provider("openai")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let provider = create_provider(&config).unwrap_or_else(|_| unreachable!());
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_create_rejects_blank_key() {
        let mut config = AgentConfig::builder()
            .api_key("test")
            .provider("gemini")
            .build()
            .unwrap_or_else(|_| unreachable!());
        config.api_key = "  ".to_string();
        let result = create_provider(&config);
        assert!(matches!(result, Err(AgentError::ApiKeyMissing { .. })));
    }
}
