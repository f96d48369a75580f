//! LLM gateway: one entry point for every model call in the pipeline.
//!
//! Wraps a shared [`LlmProvider`] with a per-call timeout, exponential
//! backoff retries on recoverable errors, and an optional fallback model
//! tried once the primary model exhausts its retries. Structured calls
//! attach a JSON Schema derived with `schemars` and run the model output
//! through [`decode`](super::decode::decode); decode failures count as
//! recoverable attempts.

use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::decode;
use super::message::{ChatRequest, ChatResponse, ResponseSchema};
use super::provider::LlmProvider;
use crate::error::AgentError;

/// Retry schedule for recoverable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt, per model.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Builds the policy from agent configuration.
    #[must_use]
    pub const fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
        }
    }

    /// Delay before retry number `attempt + 1`.
    ///
    /// Doubles per attempt, capped at `max_backoff`. A server-provided
    /// retry-after wins when it is longer.
    #[must_use]
    pub fn backoff(&self, attempt: u32, err: &AgentError) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let computed = self
            .initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff);
        match err {
            AgentError::RateLimited {
                retry_after_secs: Some(secs),
            } => computed.max(Duration::from_secs(*secs)),
            _ => computed,
        }
    }
}

/// Uniform, retrying access to the configured language model backend.
///
/// Cheap to clone; clones share the provider.
#[derive(Clone)]
pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
    timeout: Duration,
    fallback_model: Option<String>,
}

impl std::fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGateway")
            .field("provider", &self.provider.name())
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .field("fallback_model", &self.fallback_model)
            .finish()
    }
}

impl LlmGateway {
    /// Creates a gateway over `provider` using the configured retry policy,
    /// timeout and fallback model.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: &AgentConfig) -> Self {
        Self {
            provider,
            policy: RetryPolicy::from_config(config),
            timeout: config.timeout,
            fallback_model: config.fallback_model.clone(),
        }
    }

    /// Creates a gateway with explicit settings.
    #[must_use]
    pub const fn with_policy(
        provider: Arc<dyn LlmProvider>,
        policy: RetryPolicy,
        timeout: Duration,
        fallback_model: Option<String>,
    ) -> Self {
        Self {
            provider,
            policy,
            timeout,
            fallback_model,
        }
    }

    /// Name of the underlying provider.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Free-text completion. Empty completions are retried.
    ///
    /// # Errors
    ///
    /// Fatal provider errors are returned as-is. Recoverable errors that
    /// outlast every retry and the fallback model are returned as
    /// [`AgentError::RetriesExhausted`].
    pub async fn invoke_text(&self, request: ChatRequest) -> Result<String, AgentError> {
        self.run(request, |response| {
            let text = decode::strip_reasoning(&response.content);
            if text.is_empty() {
                Err(AgentError::MalformedOutput {
                    message: format!(
                        "empty completion (finish reason: {})",
                        response.finish_reason.as_deref().unwrap_or("unknown")
                    ),
                    content: response.content,
                })
            } else {
                Ok(text)
            }
        })
        .await
    }

    /// Structured completion decoded into `T`.
    ///
    /// The JSON Schema of `T` is attached to the request; the reply is
    /// decoded with the tolerant grammar in [`decode`](super::decode).
    ///
    /// # Errors
    ///
    /// As [`invoke_text`](Self::invoke_text); output that never decodes
    /// surfaces as [`AgentError::RetriesExhausted`] wrapping
    /// [`AgentError::MalformedOutput`].
    pub async fn invoke_structured<T>(&self, mut request: ChatRequest) -> Result<T, AgentError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        request.json_mode = true;
        request.response_schema = response_schema::<T>();
        self.run(request, |response| decode::decode::<T>(&response.content))
            .await
    }

    /// Runs `request` against the primary model, then the fallback model.
    async fn run<T, F>(&self, request: ChatRequest, parse: F) -> Result<T, AgentError>
    where
        F: Fn(ChatResponse) -> Result<T, AgentError>,
    {
        let mut models = vec![request.model.clone()];
        if let Some(fallback) = self
            .fallback_model
            .as_ref()
            .filter(|f| **f != request.model)
        {
            models.push(fallback.clone());
        }

        let mut attempts = 0u32;
        let mut last_err = None;
        for (model_index, model) in models.iter().enumerate() {
            if model_index > 0 {
                warn!(
                    primary = %request.model,
                    fallback = %model,
                    "Primary model exhausted retries; switching to fallback model"
                );
            }
            let mut current = request.clone();
            current.model.clone_from(model);

            for attempt in 0..=self.policy.max_retries {
                attempts += 1;
                let err = match self.attempt(&current).await {
                    Ok(response) => match parse(response) {
                        Ok(value) => return Ok(value),
                        Err(e) => e,
                    },
                    Err(e) => e,
                };

                if err.is_fatal() {
                    return Err(err);
                }
                if err.is_request_rejection() {
                    warn!(model = %current.model, error = %err, "Model rejected the request");
                    last_err = Some(err);
                    break;
                }
                if attempt < self.policy.max_retries {
                    let delay = self.policy.backoff(attempt, &err);
                    warn!(
                        model = %current.model,
                        attempt = attempt + 1,
                        max = self.policy.max_retries,
                        backoff_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Retrying after recoverable error"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(err);
            }
        }

        Err(AgentError::RetriesExhausted {
            attempts,
            last: Box::new(last_err.unwrap_or_else(|| AgentError::Orchestration {
                message: "no attempts were made".to_string(),
            })),
        })
    }

    /// One provider call bounded by the gateway timeout.
    async fn attempt(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let response = tokio::time::timeout(self.timeout, self.provider.chat(request))
            .await
            .map_err(|_| AgentError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })??;
        debug!(
            provider = self.provider.name(),
            model = %request.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            finish_reason = response.finish_reason.as_deref().unwrap_or("unknown"),
            "LLM call completed"
        );
        Ok(response)
    }
}

/// JSON Schema for `T`, shaped for provider response formats.
fn response_schema<T: JsonSchema>() -> Option<ResponseSchema> {
    let mut schema = serde_json::to_value(schemars::schema_for!(T)).ok()?;
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
    }
    Some(ResponseSchema {
        name: T::schema_name().to_string(),
        schema,
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::message::user_message;
    use crate::agent::schema::Reflection;
    use crate::agent::testing::ScriptedProvider;

    fn request(model: &str) -> ChatRequest {
        ChatRequest {
            model: model.to_string(),
            messages: vec![user_message("question")],
            temperature: Some(1.0),
            max_tokens: Some(256),
            json_mode: false,
            response_schema: None,
        }
    }

    fn gateway(provider: Arc<ScriptedProvider>, fallback: Option<&str>) -> LlmGateway {
        LlmGateway::with_policy(
            provider,
            RetryPolicy {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
            },
            Duration::from_millis(200),
            fallback.map(String::from),
        )
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        };
        let err = AgentError::Timeout { timeout_secs: 1 };
        assert_eq!(policy.backoff(0, &err), Duration::from_millis(500));
        assert_eq!(policy.backoff(1, &err), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3, &err), Duration::from_millis(4000));
        assert_eq!(policy.backoff(10, &err), Duration::from_secs(8));
        assert_eq!(policy.backoff(40, &err), Duration::from_secs(8));

        let throttled = AgentError::RateLimited {
            retry_after_secs: Some(3),
        };
        assert_eq!(policy.backoff(0, &throttled), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_text_succeeds_after_transient_failures() {
        let provider = Arc::new(ScriptedProvider::new().on("m", |_, call| match call {
            0 => Err(AgentError::Connection {
                message: "reset".to_string(),
            }),
            1 => Ok("<think>draft</think>".to_string()),
            _ => Ok("final answer".to_string()),
        }));
        let text = gateway(Arc::clone(&provider), None)
            .invoke_text(request("m"))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(text, "final answer");
        assert_eq!(provider.calls_for("m"), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new().on("m", |_, _| {
            Err(AgentError::Auth {
                provider: "openai".to_string(),
                message: "bad key".to_string(),
            })
        }));
        let result = gateway(Arc::clone(&provider), Some("backup"))
            .invoke_text(request("m"))
            .await;
        assert!(matches!(result, Err(AgentError::Auth { .. })));
        assert_eq!(provider.calls_for("m"), 1);
        assert_eq!(provider.calls_for("backup"), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_switches_to_fallback_model() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .on("m", |_, _| {
                    Err(AgentError::RateLimited {
                        retry_after_secs: None,
                    })
                })
                .on("backup", |_, _| Ok("from backup".to_string())),
        );
        let text = gateway(Arc::clone(&provider), Some("backup"))
            .invoke_text(request("m"))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(text, "from backup");
        assert_eq!(provider.calls_for("m"), 3);
        assert_eq!(provider.calls_for("backup"), 1);
    }

    #[tokio::test]
    async fn test_rejection_skips_to_fallback_without_retrying() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .on("m", |_, _| {
                    Err(AgentError::Rejected {
                        message: "maximum context length exceeded".to_string(),
                    })
                })
                .on("backup", |_, _| Ok("from backup".to_string())),
        );
        let text = gateway(Arc::clone(&provider), Some("backup"))
            .invoke_text(request("m"))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(text, "from backup");
        assert_eq!(provider.calls_for("m"), 1);
        assert_eq!(provider.calls_for("backup"), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_aggregates_attempts() {
        let provider = Arc::new(ScriptedProvider::new().on("m", |_, _| {
            Err(AgentError::ApiRequest {
                message: "upstream".to_string(),
                status: Some(502),
            })
        }));
        let result = gateway(Arc::clone(&provider), None)
            .invoke_text(request("m"))
            .await;
        match result {
            Err(AgentError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, AgentError::ApiRequest { .. }));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_recoverable() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .on("m", |_, _| Ok("late".to_string()))
                .with_delay("m", Duration::from_secs(5)),
        );
        let mut gw = gateway(Arc::clone(&provider), None);
        gw.timeout = Duration::from_millis(10);
        let result = gw.invoke_text(request("m")).await;
        match result {
            Err(AgentError::RetriesExhausted { last, .. }) => {
                assert!(matches!(*last, AgentError::Timeout { .. }));
            }
            other => panic!("expected timeout exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_structured_retries_malformed_output() {
        let provider = Arc::new(ScriptedProvider::new().on("m", |req, call| {
            assert!(req.json_mode);
            assert!(req.response_schema.is_some());
            if call == 0 {
                Ok("I think it is sufficient.".to_string())
            } else {
                Ok("```json\n{\"is_sufficient\": true, \"knowledge_gap\": \"\", \"follow_up_queries\": [],}\n```".to_string())
            }
        }));
        let reflection: Reflection = gateway(Arc::clone(&provider), None)
            .invoke_structured(request("m"))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(reflection.is_sufficient);
        assert_eq!(provider.calls_for("m"), 2);
    }

    #[test]
    fn test_response_schema_shape() {
        let schema = response_schema::<Reflection>().unwrap_or_else(|| unreachable!());
        assert_eq!(schema.name, "Reflection");
        assert!(schema.schema.get("$schema").is_none());
        assert!(schema.schema["properties"].get("is_sufficient").is_some());
    }
}
