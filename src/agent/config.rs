//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::AgentError;

/// Default number of sub-queries generated in the first round.
pub const DEFAULT_INITIAL_QUERY_COUNT: usize = 3;
/// Default maximum reflection rounds.
pub const DEFAULT_MAX_LOOPS: u32 = 2;
/// Default maximum evidence dispatches in flight.
const DEFAULT_MAX_CONCURRENCY: usize = 16;
/// Default per-call LLM timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default retries after the first attempt.
const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default first backoff delay in milliseconds.
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;
/// Default backoff ceiling in milliseconds.
const DEFAULT_MAX_BACKOFF_MS: u64 = 8_000;
/// Default web search endpoint.
const DEFAULT_SEARCH_BASE_URL: &str = "https://api.exa.ai";
/// Default web results per query.
const DEFAULT_SEARCH_RESULTS: usize = 5;
/// Max tokens for query generation and reflection calls.
const DEFAULT_PLANNING_MAX_TOKENS: u32 = 1024;
/// Max tokens for the final answer call.
const DEFAULT_ANSWER_MAX_TOKENS: u32 = 4096;

/// Supported LLM backends. All speak the `OpenAI` chat completion protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// `OpenAI` hosted API.
    OpenAi,
    /// `OpenRouter` model router.
    OpenRouter,
    /// `DeepSeek` hosted API.
    DeepSeek,
    /// Google Gemini through its `OpenAI`-compatible endpoint.
    Gemini,
    /// Local Ollama server.
    Ollama,
    /// Local LM Studio server.
    LmStudio,
}

/// Default models for the three research roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDefaults {
    /// Query generation model.
    pub query: &'static str,
    /// Reflection model.
    pub reflection: &'static str,
    /// Final answer model.
    pub answer: &'static str,
}

impl ProviderKind {
    /// All providers, in display order.
    pub const ALL: [Self; 6] = [
        Self::OpenAi,
        Self::OpenRouter,
        Self::DeepSeek,
        Self::Gemini,
        Self::Ollama,
        Self::LmStudio,
    ];

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::DeepSeek => "deepseek",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
            Self::LmStudio => "lmstudio",
        }
    }

    /// Endpoint used when no base URL is configured.
    #[must_use]
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::DeepSeek => "https://api.deepseek.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::Ollama => "http://localhost:11434/v1",
            Self::LmStudio => "http://localhost:1234/v1",
        }
    }

    /// Provider-conventional API key variable, if any.
    #[must_use]
    pub const fn key_env_var(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::OpenRouter => Some("OPENROUTER_API_KEY"),
            Self::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Ollama | Self::LmStudio => None,
        }
    }

    /// Whether requests without an API key are rejected.
    #[must_use]
    pub const fn requires_api_key(self) -> bool {
        !matches!(self, Self::Ollama | Self::LmStudio)
    }

    /// Whether the backend accepts `json_schema` response formats.
    ///
    /// Backends that do not fall back to plain JSON mode.
    #[must_use]
    pub const fn supports_json_schema(self) -> bool {
        !matches!(self, Self::DeepSeek)
    }

    /// Default per-role models.
    #[must_use]
    pub const fn default_models(self) -> ModelDefaults {
        match self {
            Self::OpenAi => ModelDefaults {
                query: "gpt-4.1-mini",
                reflection: "gpt-4.1-mini",
                answer: "gpt-4.1",
            },
            Self::OpenRouter => ModelDefaults {
                query: "openai/gpt-4.1-mini",
                reflection: "openai/gpt-4.1-mini",
                answer: "openai/gpt-4.1",
            },
            Self::DeepSeek => ModelDefaults {
                query: "deepseek-chat",
                reflection: "deepseek-chat",
                answer: "deepseek-chat",
            },
            Self::Gemini => ModelDefaults {
                query: "gemini-2.0-flash",
                reflection: "gemini-2.5-flash",
                answer: "gemini-2.5-pro",
            },
            Self::Ollama => ModelDefaults {
                query: "qwen3:8b",
                reflection: "qwen3:8b",
                answer: "qwen3:8b",
            },
            Self::LmStudio => ModelDefaults {
                query: "qwen3-8b",
                reflection: "qwen3-8b",
                answer: "qwen3-8b",
            },
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], "");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| AgentError::UnsupportedProvider {
                name: s.to_string(),
            })
    }
}

/// Which evidence adapters a request consults, and in what order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Web search only.
    #[default]
    InternetOnly,
    /// Local network pages only.
    LocalOnly,
    /// Web search, then local network pages.
    InternetThenLocal,
    /// Local network pages, then web search.
    LocalThenInternet,
    /// LLM-planned read-only SQL against a `SQLite` database.
    Database,
}

impl SearchMode {
    /// All modes, in display order.
    pub const ALL: [Self; 5] = [
        Self::InternetOnly,
        Self::LocalOnly,
        Self::InternetThenLocal,
        Self::LocalThenInternet,
        Self::Database,
    ];

    /// Canonical `snake_case` name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InternetOnly => "internet_only",
            Self::LocalOnly => "local_only",
            Self::InternetThenLocal => "internet_then_local",
            Self::LocalThenInternet => "local_then_internet",
            Self::Database => "database",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| AgentError::InvalidConfig {
                message: format!(
                    "unknown search mode '{s}' (expected one of: {})",
                    Self::ALL.map(Self::as_str).join(", ")
                ),
            })
    }
}

/// Configuration for the research agent.
#[derive(Clone)]
pub struct AgentConfig {
    /// LLM backend.
    pub provider: ProviderKind,
    /// API key for the provider. Empty for local servers without auth.
    pub api_key: String,
    /// Endpoint override.
    pub base_url: Option<String>,
    /// Model for sub-query generation.
    pub query_model: String,
    /// Model for reflection.
    pub reflection_model: String,
    /// Model for the final answer.
    pub answer_model: String,
    /// Secondary model tried once the primary exhausts its retries.
    pub fallback_model: Option<String>,
    /// Sub-queries requested in the first round, and the fan-out ceiling
    /// for follow-up rounds.
    pub initial_query_count: usize,
    /// Maximum reflection rounds.
    pub max_loops: u32,
    /// Maximum evidence dispatches in flight across all requests.
    pub max_concurrency: usize,
    /// Per-call LLM timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First retry delay; doubles per attempt.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Max tokens for query generation and reflection.
    pub planning_max_tokens: u32,
    /// Max tokens for the final answer.
    pub answer_max_tokens: u32,
    /// Evidence adapters to consult.
    pub search_mode: SearchMode,
    /// Web search API key.
    pub search_api_key: Option<String>,
    /// Web search endpoint.
    pub search_base_url: String,
    /// Web results per query.
    pub search_results: usize,
    /// Hosts or URLs crawled by the local network adapter.
    pub local_search_domains: Vec<String>,
    /// `SQLite` database for the database adapter.
    pub database_path: Option<PathBuf>,
    /// Directory containing prompt template files.
    ///
    /// When set, prompts load from markdown files in this directory,
    /// falling back to compiled-in defaults for any missing files.
    pub prompt_dir: Option<PathBuf>,
    /// Overall deadline for one research request.
    pub deadline: Option<Duration>,
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("query_model", &self.query_model)
            .field("reflection_model", &self.reflection_model)
            .field("answer_model", &self.answer_model)
            .field("fallback_model", &self.fallback_model)
            .field("initial_query_count", &self.initial_query_count)
            .field("max_loops", &self.max_loops)
            .field("max_concurrency", &self.max_concurrency)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("search_mode", &self.search_mode)
            .field(
                "search_api_key",
                &self.search_api_key.as_deref().map(redact),
            )
            .field("search_base_url", &self.search_base_url)
            .field("local_search_domains", &self.local_search_domains)
            .field("database_path", &self.database_path)
            .field("prompt_dir", &self.prompt_dir)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "<redacted>" }
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if a hosted provider has no key,
    /// or [`AgentError::InvalidConfig`] for rejected values.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Effective endpoint for the configured provider.
    #[must_use]
    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    query_model: Option<String>,
    reflection_model: Option<String>,
    answer_model: Option<String>,
    fallback_model: Option<String>,
    initial_query_count: Option<usize>,
    max_loops: Option<u32>,
    max_concurrency: Option<usize>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    search_mode: Option<String>,
    search_api_key: Option<String>,
    search_base_url: Option<String>,
    search_results: Option<usize>,
    local_search_domains: Option<Vec<String>>,
    database_path: Option<PathBuf>,
    prompt_dir: Option<PathBuf>,
    deadline: Option<Duration>,
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|v| v.trim().parse().ok())
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = env_string("SCOUT_PROVIDER");
        }
        if self.api_key.is_none() {
            let kind = self
                .provider
                .as_deref()
                .and_then(|p| p.parse::<ProviderKind>().ok())
                .unwrap_or(ProviderKind::OpenAi);
            self.api_key = env_string("SCOUT_API_KEY")
                .or_else(|| kind.key_env_var().and_then(env_string));
        }
        if self.base_url.is_none() {
            self.base_url = env_string("SCOUT_BASE_URL");
        }
        if self.query_model.is_none() {
            self.query_model = env_string("SCOUT_QUERY_MODEL");
        }
        if self.reflection_model.is_none() {
            self.reflection_model = env_string("SCOUT_REFLECTION_MODEL");
        }
        if self.answer_model.is_none() {
            self.answer_model = env_string("SCOUT_ANSWER_MODEL");
        }
        if self.fallback_model.is_none() {
            self.fallback_model = env_string("SCOUT_FALLBACK_MODEL");
        }
        if self.initial_query_count.is_none() {
            self.initial_query_count = env_parse("SCOUT_INITIAL_QUERIES");
        }
        if self.max_loops.is_none() {
            self.max_loops = env_parse("SCOUT_MAX_LOOPS");
        }
        if self.max_concurrency.is_none() {
            self.max_concurrency = env_parse("SCOUT_MAX_CONCURRENCY");
        }
        if self.timeout.is_none() {
            self.timeout = env_parse("SCOUT_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.max_retries.is_none() {
            self.max_retries = env_parse("SCOUT_MAX_RETRIES");
        }
        if self.search_mode.is_none() {
            self.search_mode = env_string("SCOUT_SEARCH_MODE");
        }
        if self.search_api_key.is_none() {
            self.search_api_key =
                env_string("SCOUT_SEARCH_API_KEY").or_else(|| env_string("EXA_API_KEY"));
        }
        if self.search_base_url.is_none() {
            self.search_base_url = env_string("SCOUT_SEARCH_BASE_URL");
        }
        if self.search_results.is_none() {
            self.search_results = env_parse("SCOUT_SEARCH_RESULTS");
        }
        if self.local_search_domains.is_none() {
            self.local_search_domains = env_string("SCOUT_LOCAL_DOMAINS").map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(String::from)
                    .collect()
            });
        }
        if self.database_path.is_none() {
            self.database_path = env_string("SCOUT_DATABASE_PATH").map(PathBuf::from);
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = env_string("SCOUT_PROMPT_DIR").map(PathBuf::from);
        }
        if self.deadline.is_none() {
            self.deadline = env_parse("SCOUT_DEADLINE_SECS").map(Duration::from_secs);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the query generation model.
    #[must_use]
    pub fn query_model(mut self, model: impl Into<String>) -> Self {
        self.query_model = Some(model.into());
        self
    }

    /// Sets the reflection model.
    #[must_use]
    pub fn reflection_model(mut self, model: impl Into<String>) -> Self {
        self.reflection_model = Some(model.into());
        self
    }

    /// Sets the final answer model.
    #[must_use]
    pub fn answer_model(mut self, model: impl Into<String>) -> Self {
        self.answer_model = Some(model.into());
        self
    }

    /// Sets the fallback model.
    #[must_use]
    pub fn fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = Some(model.into());
        self
    }

    /// Sets the first-round query count.
    #[must_use]
    pub const fn initial_query_count(mut self, n: usize) -> Self {
        self.initial_query_count = Some(n);
        self
    }

    /// Sets the maximum reflection rounds.
    #[must_use]
    pub const fn max_loops(mut self, n: u32) -> Self {
        self.max_loops = Some(n);
        self
    }

    /// Sets the maximum concurrency.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the max retries.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the first retry delay.
    #[must_use]
    pub const fn initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = Some(delay);
        self
    }

    /// Sets the backoff ceiling.
    #[must_use]
    pub const fn max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = Some(delay);
        self
    }

    /// Sets the search mode by name.
    #[must_use]
    pub fn search_mode(mut self, mode: impl Into<String>) -> Self {
        self.search_mode = Some(mode.into());
        self
    }

    /// Sets the web search API key.
    #[must_use]
    pub fn search_api_key(mut self, key: impl Into<String>) -> Self {
        self.search_api_key = Some(key.into());
        self
    }

    /// Sets the web search endpoint.
    #[must_use]
    pub fn search_base_url(mut self, url: impl Into<String>) -> Self {
        self.search_base_url = Some(url.into());
        self
    }

    /// Sets the web results per query.
    #[must_use]
    pub const fn search_results(mut self, n: usize) -> Self {
        self.search_results = Some(n);
        self
    }

    /// Sets the local network hosts.
    #[must_use]
    pub fn local_search_domains(mut self, domains: Vec<String>) -> Self {
        self.local_search_domains = Some(domains);
        self
    }

    /// Sets the `SQLite` database path.
    #[must_use]
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Sets the overall request deadline.
    #[must_use]
    pub const fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnsupportedProvider`] for unknown providers,
    /// [`AgentError::ApiKeyMissing`] if a hosted provider has no key, and
    /// [`AgentError::InvalidConfig`] for zero counts or unknown search modes.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let provider = self
            .provider
            .as_deref()
            .map_or(Ok(ProviderKind::OpenAi), str::parse)?;

        let api_key = match self.api_key.filter(|k| !k.trim().is_empty()) {
            Some(key) => key,
            None if provider.requires_api_key() => {
                return Err(AgentError::ApiKeyMissing {
                    provider: provider.to_string(),
                });
            }
            None => String::new(),
        };

        let search_mode = self
            .search_mode
            .as_deref()
            .map_or(Ok(SearchMode::default()), str::parse)?;

        let initial_query_count = self
            .initial_query_count
            .unwrap_or(DEFAULT_INITIAL_QUERY_COUNT);
        let max_loops = self.max_loops.unwrap_or(DEFAULT_MAX_LOOPS);
        let max_concurrency = self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY);
        let search_results = self.search_results.unwrap_or(DEFAULT_SEARCH_RESULTS);
        for (name, value) in [
            ("initial_query_count", initial_query_count),
            ("max_loops", max_loops as usize),
            ("max_concurrency", max_concurrency),
            ("search_results", search_results),
        ] {
            if value == 0 {
                return Err(AgentError::InvalidConfig {
                    message: format!("{name} must be at least 1"),
                });
            }
        }

        let models = provider.default_models();

        Ok(AgentConfig {
            provider,
            api_key,
            base_url: self.base_url,
            query_model: self
                .query_model
                .unwrap_or_else(|| models.query.to_string()),
            reflection_model: self
                .reflection_model
                .unwrap_or_else(|| models.reflection.to_string()),
            answer_model: self
                .answer_model
                .unwrap_or_else(|| models.answer.to_string()),
            fallback_model: self.fallback_model,
            initial_query_count,
            max_loops,
            max_concurrency,
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            initial_backoff: self
                .initial_backoff
                .unwrap_or(Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS)),
            max_backoff: self
                .max_backoff
                .unwrap_or(Duration::from_millis(DEFAULT_MAX_BACKOFF_MS)),
            planning_max_tokens: DEFAULT_PLANNING_MAX_TOKENS,
            answer_max_tokens: DEFAULT_ANSWER_MAX_TOKENS,
            search_mode,
            search_api_key: self.search_api_key,
            search_base_url: self
                .search_base_url
                .unwrap_or_else(|| DEFAULT_SEARCH_BASE_URL.to_string()),
            search_results,
            local_search_domains: self.local_search_domains.unwrap_or_default(),
            database_path: self.database_path,
            prompt_dir: self.prompt_dir,
            deadline: self.deadline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = AgentConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.initial_query_count, DEFAULT_INITIAL_QUERY_COUNT);
        assert_eq!(config.max_loops, DEFAULT_MAX_LOOPS);
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.search_mode, SearchMode::InternetOnly);
        assert_eq!(config.query_model, "gpt-4.1-mini");
        assert_eq!(config.effective_base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_builder_missing_api_key() {
        let result = AgentConfig::builder().provider("openai").build();
        assert!(matches!(result, Err(AgentError::ApiKeyMissing { .. })));
    }

    #[test]
    fn test_local_provider_needs_no_key() {
        let config = AgentConfig::builder()
            .provider("ollama")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, ProviderKind::Ollama);
        assert!(config.api_key.is_empty());
        assert_eq!(config.effective_base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_builder_custom_values() {
        let config = AgentConfig::builder()
            .api_key("key")
            .provider("DeepSeek")
            .query_model("custom-query")
            .max_concurrency(4)
            .initial_query_count(5)
            .max_loops(3)
            .search_mode("local-then-internet")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, ProviderKind::DeepSeek);
        assert_eq!(config.query_model, "custom-query");
        assert_eq!(config.answer_model, "deepseek-chat");
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.initial_query_count, 5);
        assert_eq!(config.max_loops, 3);
        assert_eq!(config.search_mode, SearchMode::LocalThenInternet);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_counts_rejected() {
        let result = AgentConfig::builder().api_key("k").max_loops(0).build();
        assert!(matches!(result, Err(AgentError::InvalidConfig { .. })));

        let result = AgentConfig::builder()
            .api_key("k")
            .initial_query_count(0)
            .build();
        assert!(matches!(result, Err(AgentError::InvalidConfig { .. })));
    }

    #[test]
    fn test_unknown_provider_and_mode() {
        let result = AgentConfig::builder().api_key("k").provider("bard").build();
        assert!(matches!(result, Err(AgentError::UnsupportedProvider { .. })));

        let result = AgentConfig::builder()
            .api_key("k")
            .search_mode("intranet")
            .build();
        assert!(matches!(result, Err(AgentError::InvalidConfig { .. })));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = AgentConfig::builder()
            .api_key("sk-secret")
            .search_api_key("exa-secret")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("exa-secret"));
    }

    #[test]
    fn test_provider_round_trip_names() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().ok(), Some(kind));
        }
        for mode in SearchMode::ALL {
            assert_eq!(mode.as_str().parse::<SearchMode>().ok(), Some(mode));
        }
    }
}
