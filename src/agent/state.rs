//! Research request, per-request loop state, and the final outcome.

use std::time::Duration;

use serde::Serialize;

use super::citation::{SourceRecord, SourceRegistry};
use super::message::{ChatMessage, Role};
use crate::error::AgentError;

/// An incoming research question. Read-only once built.
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    /// Conversation history, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Overrides the configured first-round query count.
    pub initial_query_count: Option<usize>,
    /// Overrides the configured reflection round limit.
    pub max_loops: Option<u32>,
}

impl ResearchRequest {
    /// Request with a single user question.
    #[must_use]
    pub fn new(question: impl Into<String>) -> Self {
        Self::from_messages(vec![ChatMessage {
            role: Role::User,
            content: question.into(),
        }])
    }

    /// Request carrying a conversation history.
    #[must_use]
    pub const fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            initial_query_count: None,
            max_loops: None,
        }
    }

    /// Sets the first-round query count override.
    #[must_use]
    pub const fn with_initial_query_count(mut self, n: usize) -> Self {
        self.initial_query_count = Some(n);
        self
    }

    /// Sets the reflection round limit override.
    #[must_use]
    pub const fn with_max_loops(mut self, n: u32) -> Self {
        self.max_loops = Some(n);
        self
    }
}

/// Derives the research topic from conversation history.
///
/// A single message is the topic. Longer histories become a transcript of
/// user and assistant turns.
///
/// # Errors
///
/// Returns [`AgentError::EmptyTopic`] when the result is blank.
pub fn derive_topic(messages: &[ChatMessage]) -> Result<String, AgentError> {
    let topic = match messages {
        [only] => only.content.trim().to_string(),
        _ => messages
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .filter_map(|m| match m.role {
                Role::User => Some(format!("User: {}\n", m.content.trim())),
                Role::Assistant => Some(format!("Assistant: {}\n", m.content.trim())),
                Role::System => None,
            })
            .collect(),
    };
    if topic.trim().is_empty() {
        Err(AgentError::EmptyTopic)
    } else {
        Ok(topic)
    }
}

/// Outcome of the latest reflection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sufficiency {
    /// No reflection has run yet.
    #[default]
    Unknown,
    /// Evidence answers the topic.
    Sufficient,
    /// Evidence falls short.
    Insufficient,
}

/// One dispatch's contribution to the evidence log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceEntry {
    /// Round that produced the entry, starting at 1.
    pub round: u32,
    /// Dispatch id, unique within the request.
    pub dispatch_id: u64,
    /// Sub-query that was searched.
    pub query: String,
    /// Evidence text, with canonical citation tokens.
    pub text: String,
    /// Tokens of the sources this entry cites.
    pub source_tokens: Vec<String>,
    /// Whether the entry is a failure placeholder.
    pub degraded: bool,
}

/// Mutable state of one research request.
///
/// Owned by the controller for the lifetime of the request; never shared.
#[derive(Debug)]
pub struct ResearchState {
    /// Research topic. Never empty.
    pub topic: String,
    /// Sub-queries awaiting the next evidence round.
    pub pending_queries: Vec<String>,
    /// Every evidence entry across all rounds. Append-only.
    pub evidence_log: Vec<EvidenceEntry>,
    /// Every source gathered. Grows until finalization.
    pub sources_gathered: SourceRegistry,
    /// Completed reflections.
    pub loop_count: u32,
    /// Latest reflection verdict.
    pub sufficiency: Sufficiency,
    /// Rationale from the latest reflection.
    pub knowledge_gap: String,
    /// Next unused dispatch id.
    pub next_dispatch_id: u64,
    /// Evidence rounds run.
    pub rounds: u32,
    /// Dispatches that degraded to a placeholder.
    pub dispatch_failures: usize,
    /// Human-readable record of every fallback taken.
    pub degradations: Vec<String>,
}

impl ResearchState {
    /// Fresh state for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::EmptyTopic`] for a blank topic.
    pub fn new(topic: String) -> Result<Self, AgentError> {
        if topic.trim().is_empty() {
            return Err(AgentError::EmptyTopic);
        }
        Ok(Self {
            topic,
            pending_queries: Vec::new(),
            evidence_log: Vec::new(),
            sources_gathered: SourceRegistry::new(),
            loop_count: 0,
            sufficiency: Sufficiency::Unknown,
            knowledge_gap: String::new(),
            next_dispatch_id: 0,
            rounds: 0,
            dispatch_failures: 0,
            degradations: Vec::new(),
        })
    }

    /// Concatenated evidence text of every round so far.
    #[must_use]
    pub fn evidence_context(&self) -> String {
        self.evidence_log
            .iter()
            .map(|entry| entry.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }

    /// Reserves `count` consecutive dispatch ids.
    pub fn reserve_dispatch_ids(&mut self, count: usize) -> std::ops::Range<u64> {
        let start = self.next_dispatch_id;
        self.next_dispatch_id = start + count as u64;
        start..self.next_dispatch_id
    }
}

/// Final result of a research request.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchOutcome {
    /// Answer with citations resolved to origins.
    pub answer: String,
    /// Sources cited in the answer.
    pub cited_sources: Vec<SourceRecord>,
    /// Topic the loop researched.
    pub topic: String,
    /// Reflections run.
    pub loop_count: u32,
    /// Evidence rounds run.
    pub rounds: u32,
    /// Sub-queries dispatched across all rounds.
    pub queries_dispatched: usize,
    /// Dispatches that degraded to a placeholder.
    pub dispatch_failures: usize,
    /// Distinct sources gathered before filtering.
    pub sources_gathered: usize,
    /// Fallbacks taken during the loop.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<String>,
    /// Last reflection's gap rationale.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub knowledge_gap: String,
    /// Wall-clock time.
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_duration<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_f64(d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{assistant_message, system_message, user_message};

    #[test]
    fn test_single_message_topic() {
        let topic = derive_topic(&[user_message("  What is the capital of France?  ")]);
        assert_eq!(topic.ok().as_deref(), Some("What is the capital of France?"));
    }

    #[test]
    fn test_history_topic_transcript() {
        let topic = derive_topic(&[
            system_message("ignored"),
            user_message("Who wrote Dune?"),
            assistant_message("Frank Herbert."),
            user_message("When was it published?"),
        ])
        .unwrap_or_default();
        assert_eq!(
            topic,
            "User: Who wrote Dune?\nAssistant: Frank Herbert.\nUser: When was it published?\n"
        );
    }

    #[test]
    fn test_empty_topic_is_fatal() {
        assert!(matches!(derive_topic(&[]), Err(AgentError::EmptyTopic)));
        assert!(matches!(
            derive_topic(&[user_message("   ")]),
            Err(AgentError::EmptyTopic)
        ));
        assert!(matches!(
            derive_topic(&[system_message("a"), system_message("b")]),
            Err(AgentError::EmptyTopic)
        ));
        assert!(ResearchState::new(" ".to_string()).is_err());
    }

    #[test]
    fn test_dispatch_ids_never_reused() {
        let mut state = ResearchState::new("topic".to_string()).unwrap_or_else(|_| unreachable!());
        assert_eq!(state.reserve_dispatch_ids(3), 0..3);
        assert_eq!(state.reserve_dispatch_ids(0), 3..3);
        assert_eq!(state.reserve_dispatch_ids(2), 3..5);
    }

    #[test]
    fn test_request_overrides() {
        let request = ResearchRequest::new("q")
            .with_initial_query_count(1)
            .with_max_loops(4);
        assert_eq!(request.initial_query_count, Some(1));
        assert_eq!(request.max_loops, Some(4));
        assert_eq!(request.messages.len(), 1);
    }
}
