//! Error types for scout-rs.
//!
//! [`AgentError`] covers the research pipeline (LLM gateway, evidence
//! sources, loop control). [`CommandError`] covers the CLI surface.
//!
//! Errors fall into two classes, queried with [`AgentError::is_recoverable`]:
//! recoverable errors (timeouts, rate limits, malformed model output,
//! transient network failures) are retried by the gateway and degraded by
//! the research loop; fatal errors (missing credentials, invalid
//! configuration, cancellation) abort the request.

/// Result alias for CLI commands.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for the binary surface.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Research pipeline failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// CLI command failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the research pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// No API key configured for a provider that requires one.
    #[error("API key missing for provider '{provider}'. Set SCOUT_API_KEY or the provider's key variable")]
    ApiKeyMissing {
        /// Provider that needs the key.
        provider: String,
    },

    /// Provider name not recognized.
    #[error("unsupported LLM provider: {name}")]
    UnsupportedProvider {
        /// The rejected provider name.
        name: String,
    },

    /// Configuration value rejected at build time.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What was wrong.
        message: String,
    },

    /// Provider rejected the credentials.
    #[error("authentication failed for provider '{provider}': {message}")]
    Auth {
        /// Provider name.
        provider: String,
        /// Provider message.
        message: String,
    },

    /// Non-classified API failure.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Error message.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// Provider refused this particular request (context too long,
    /// content filter, unsupported parameter). Another model or a smaller
    /// prompt may succeed, so callers degrade instead of aborting.
    #[error("request rejected by provider: {message}")]
    Rejected {
        /// Provider message.
        message: String,
    },

    /// Provider throttled the request.
    #[error("rate limited by provider{}", retry_hint(.retry_after_secs))]
    RateLimited {
        /// Server-suggested wait, when provided.
        retry_after_secs: Option<u64>,
    },

    /// Call exceeded its deadline.
    #[error("request timed out after {timeout_secs}s")]
    Timeout {
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// Transport-level failure.
    #[error("connection failed: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    /// Model output could not be coerced into the requested shape.
    #[error("malformed model output: {message}")]
    MalformedOutput {
        /// Parse diagnostic.
        message: String,
        /// Raw model output.
        content: String,
    },

    /// Recoverable failures persisted through every retry and fallback.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Total attempts made across models.
        attempts: u32,
        /// The final error observed.
        last: Box<AgentError>,
    },

    /// An evidence source failed. Absorbed by the evidence guard.
    #[error("evidence source '{source_name}' failed: {message}")]
    Evidence {
        /// Adapter name.
        source_name: String,
        /// Error message.
        message: String,
    },

    /// Conversation history produced no usable research topic.
    #[error("research topic is empty; the request needs at least one non-empty message")]
    EmptyTopic,

    /// Request was cancelled or hit its overall deadline.
    #[error("research request cancelled before completion: {reason}")]
    Cancelled {
        /// Why the request stopped.
        reason: String,
    },

    /// Internal orchestration failure.
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Error message.
        message: String,
    },
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs.map_or_else(String::new, |s| format!(", retry after {s}s"))
}

impl AgentError {
    /// Returns `true` for errors worth retrying or degrading from.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout { .. }
            | Self::Connection { .. }
            | Self::MalformedOutput { .. }
            | Self::Rejected { .. }
            | Self::RetriesExhausted { .. }
            | Self::Evidence { .. }
            | Self::Orchestration { .. } => true,
            Self::ApiRequest { status, .. } => match status {
                Some(code) => *code >= 500 || *code == 408 || *code == 429,
                None => true,
            },
            Self::ApiKeyMissing { .. }
            | Self::UnsupportedProvider { .. }
            | Self::InvalidConfig { .. }
            | Self::Auth { .. }
            | Self::EmptyTopic
            | Self::Cancelled { .. } => false,
        }
    }

    /// Returns `true` when retrying the same request on the same model
    /// cannot help.
    #[must_use]
    pub const fn is_request_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Returns `true` for errors that must abort the request.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

/// Errors raised by CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Command failed to run.
    #[error("command failed: {0}")]
    ExecutionFailed(String),

    /// Argument rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
