//! Research agent for scout-rs.
//!
//! Turns a question into a cited answer by iterating search and
//! reflection. All model calls go through one [`LlmGateway`]; evidence
//! comes from a pluggable [`EvidenceSource`].
//!
//! # Architecture
//!
//! ```text
//! Question → Orchestrator
//!   ├── QueryWriterAgent (first-round sub-queries)
//!   ├── loop
//!   │   ├── Fan-out → N concurrent dispatches against the EvidenceSource
//!   │   │   └── web / local network / database / composite
//!   │   ├── Merge results in dispatch order, dedupe sources
//!   │   └── ReflectionAgent → sufficient? follow-up queries?
//!   └── Finalizer
//!       ├── SynthesizerAgent → answer with short citation tokens
//!       └── Citation substitution → answer with real origins
//! ```

pub mod citation;
pub mod client;
pub mod config;
pub mod decode;
pub mod evidence;
pub mod finalizer;
pub mod gateway;
pub mod message;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod query_writer;
pub mod reflector;
pub mod schema;
pub mod state;
pub mod synthesizer;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types
pub use citation::{SourceRecord, SourceRegistry, TokenAllocator};
pub use config::{AgentConfig, ProviderKind, SearchMode};
pub use evidence::{DispatchContext, DispatchResult, EvidenceItem, EvidenceSource};
pub use gateway::LlmGateway;
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use orchestrator::Orchestrator;
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use query_writer::QueryWriterAgent;
pub use reflector::ReflectionAgent;
pub use schema::{Reflection, SearchQueryList, SqlPlan, SqlStatement};
pub use state::{ResearchOutcome, ResearchRequest, ResearchState};
pub use synthesizer::SynthesizerAgent;
pub use traits::Agent;
