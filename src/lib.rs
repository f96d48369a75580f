//! # scout-rs
//!
//! An iterative research agent. Given a question, it asks a model for
//! search queries, gathers evidence for them concurrently from the web, a
//! local network or a `SQLite` database, reflects on whether the evidence
//! is enough, loops with follow-up queries until it is, and writes an
//! answer whose citations point at the sources actually used.
//!
//! ```no_run
//! use scout_rs::agent::{AgentConfig, Orchestrator, ResearchRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), scout_rs::error::AgentError> {
//! let config = AgentConfig::from_env()?;
//! let orchestrator = Orchestrator::from_config(config)?;
//! let outcome = orchestrator
//!     .research(&ResearchRequest::new("Who maintains tokio?"), &CancellationToken::new())
//!     .await?;
//! assert!(!outcome.answer.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod error;

pub use error::{AgentError, CommandError, Error, Result};
