//! `OpenAI`-compatible provider implementation using the `async-openai` crate.
//!
//! Every supported backend (`OpenAI`, `OpenRouter`, `DeepSeek`, Gemini,
//! Ollama, LM Studio) speaks the same chat completion protocol, so one
//! implementation serves them all; [`ProviderKind`] only selects the
//! endpoint and the response format capabilities.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest, ResponseFormat,
    ResponseFormatJsonSchema,
};
use async_trait::async_trait;

use crate::agent::config::{AgentConfig, ProviderKind};
use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::LlmProvider;
use crate::error::AgentError;

/// `OpenAI`-compatible LLM provider.
pub struct OpenAiCompatibleProvider {
    client: Client<OpenAIConfig>,
    kind: ProviderKind,
}

impl OpenAiCompatibleProvider {
    /// Creates a new provider from agent configuration.
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        // Local servers ignore the key but the client always sends a bearer header.
        let api_key = if config.api_key.is_empty() {
            config.provider.as_str()
        } else {
            config.api_key.as_str()
        };
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(config.effective_base_url());

        Self {
            client: Client::with_config(openai_config),
            kind: config.provider,
        }
    }

    /// Converts our message type to the `OpenAI` SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                name: None,
            }),
            Role::Assistant => {
                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                        msg.content.clone(),
                    )),
                    name: None,
                    tool_calls: None,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
        }
    }

    /// Picks the response format for a request.
    ///
    /// Schemas are sent natively when the backend accepts them; otherwise
    /// the request degrades to plain JSON mode and the gateway's decoder
    /// enforces the shape.
    fn response_format(kind: ProviderKind, request: &ChatRequest) -> Option<ResponseFormat> {
        match &request.response_schema {
            Some(schema) if kind.supports_json_schema() => Some(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: schema.name.clone(),
                    schema: Some(schema.schema.clone()),
                    strict: Some(false),
                },
            }),
            Some(_) => Some(ResponseFormat::JsonObject),
            None if request.json_mode => Some(ResponseFormat::JsonObject),
            None => None,
        }
    }

    /// Builds an `OpenAI` chat completion request from our generic request.
    fn build_request(kind: ProviderKind, request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            max_completion_tokens: request.max_tokens,
            response_format: Self::response_format(kind, request),
            ..Default::default()
        }
    }

    /// Maps SDK errors onto the recoverable/fatal taxonomy.
    fn classify_error(kind: ProviderKind, err: OpenAIError) -> AgentError {
        match err {
            OpenAIError::ApiError(api) => {
                let tag = format!(
                    "{} {}",
                    api.r#type.as_deref().unwrap_or_default(),
                    api.code.as_deref().unwrap_or_default()
                )
                .to_ascii_lowercase();
                let message = api.message;
                if tag.contains("rate_limit") || tag.contains("quota") {
                    AgentError::RateLimited {
                        retry_after_secs: None,
                    }
                } else if tag.contains("auth")
                    || tag.contains("invalid_api_key")
                    || tag.contains("permission")
                {
                    AgentError::Auth {
                        provider: kind.to_string(),
                        message,
                    }
                } else if tag.contains("not_found") {
                    AgentError::ApiRequest {
                        message,
                        status: Some(404),
                    }
                } else if tag.contains("invalid_request") || tag.contains("content_filter") {
                    AgentError::Rejected { message }
                } else {
                    AgentError::ApiRequest {
                        message,
                        status: None,
                    }
                }
            }
            OpenAIError::Reqwest(e) if e.is_timeout() => AgentError::Timeout { timeout_secs: 0 },
            OpenAIError::Reqwest(e) => match e.status().map(|s| s.as_u16()) {
                Some(401 | 403) => AgentError::Auth {
                    provider: kind.to_string(),
                    message: e.to_string(),
                },
                Some(429) => AgentError::RateLimited {
                    retry_after_secs: None,
                },
                Some(400 | 413 | 422) => AgentError::Rejected {
                    message: e.to_string(),
                },
                status @ Some(_) => AgentError::ApiRequest {
                    message: e.to_string(),
                    status,
                },
                None => AgentError::Connection {
                    message: e.to_string(),
                },
            },
            OpenAIError::JSONDeserialize(e) => AgentError::ApiRequest {
                message: format!("unreadable response body: {e}"),
                status: None,
            },
            other => AgentError::ApiRequest {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("kind", &self.kind)
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let openai_request = Self::build_request(self.kind, request);

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(|e| Self::classify_error(self.kind, e))?;

        let choice = response.choices.first();

        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let finish_reason = choice.and_then(|c| {
            c.finish_reason
                .as_ref()
                .map(|fr| format!("{fr:?}").to_lowercase())
        });

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(ChatResponse {
            content,
            usage,
            finish_reason,
        })
    }
}
