//! Result finalizer: one answer call over the whole evidence log, then
//! citation substitution.

use std::time::Instant;

use tracing::{info, warn};

use super::citation::substitute;
use super::gateway::LlmGateway;
use super::state::{ResearchOutcome, ResearchState};
use super::synthesizer::SynthesizerAgent;
use crate::error::AgentError;

/// Writes the answer for `state` and resolves its citations.
///
/// Consumes the state; nothing about the request survives finalization
/// except the returned outcome.
///
/// # Errors
///
/// Propagates the answer call's error. There is no fallback at this point.
pub async fn finalize(
    gateway: &LlmGateway,
    synthesizer: &SynthesizerAgent,
    mut state: ResearchState,
    started: Instant,
) -> Result<ResearchOutcome, AgentError> {
    info!(
        entries = state.evidence_log.len(),
        sources = state.sources_gathered.len(),
        "Writing final answer"
    );
    let answer = synthesizer
        .synthesize(gateway, &state.topic, &state.evidence_context())
        .await?;

    let resolved = substitute(&answer, &state.sources_gathered);
    if !resolved.unknown_tokens.is_empty() {
        warn!(
            tokens = resolved.unknown_tokens.len(),
            "Removed citations to unknown sources from the answer"
        );
        state.degradations.push(format!(
            "answer cited {} unknown source token(s); removed",
            resolved.unknown_tokens.len()
        ));
    }

    Ok(ResearchOutcome {
        answer: resolved.display_text,
        cited_sources: resolved.cited_sources,
        topic: state.topic,
        loop_count: state.loop_count,
        rounds: state.rounds,
        queries_dispatched: usize::try_from(state.next_dispatch_id).unwrap_or(usize::MAX),
        dispatch_failures: state.dispatch_failures,
        sources_gathered: state.sources_gathered.len(),
        degradations: state.degradations,
        knowledge_gap: state.knowledge_gap,
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent::citation::SourceRecord;
    use crate::agent::config::AgentConfig;
    use crate::agent::prompt::PromptSet;
    use crate::agent::provider::LlmProvider;
    use crate::agent::state::EvidenceEntry;
    use crate::agent::testing::ScriptedProvider;

    fn setup(provider: ScriptedProvider) -> (LlmGateway, SynthesizerAgent) {
        let config = AgentConfig::builder()
            .api_key("k")
            .answer_model("answer-model")
            .max_retries(0)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let provider: Arc<dyn LlmProvider> = Arc::new(provider);
        let agent = SynthesizerAgent::new(&config, &PromptSet::defaults(), "May 01, 2026");
        (LlmGateway::new(provider, &config), agent)
    }

    fn state() -> ResearchState {
        let mut state =
            ResearchState::new("Who won?".to_string()).unwrap_or_else(|_| unreachable!());
        state.sources_gathered.merge(vec![
            SourceRecord {
                short_token: "cite://0-1".to_string(),
                origin: "https://a.example".to_string(),
                label: "A".to_string(),
                snippet: String::new(),
            },
            SourceRecord {
                short_token: "cite://0-2".to_string(),
                origin: "https://b.example".to_string(),
                label: "B".to_string(),
                snippet: String::new(),
            },
        ]);
        state.evidence_log.push(EvidenceEntry {
            round: 1,
            dispatch_id: 0,
            query: "who won".to_string(),
            text: "A says X [A](cite://0-1). B says Y [B](cite://0-2).".to_string(),
            source_tokens: vec!["cite://0-1".to_string(), "cite://0-2".to_string()],
            degraded: false,
        });
        state.next_dispatch_id = 1;
        state.rounds = 1;
        state.loop_count = 1;
        state
    }

    #[tokio::test]
    async fn test_only_cited_sources_survive() {
        let (gateway, agent) = setup(ScriptedProvider::new().on("answer-model", |_, _| {
            Ok("X won [A](cite://0-1), see also [ghost](cite://9-9).".to_string())
        }));
        let outcome = finalize(&gateway, &agent, state(), Instant::now())
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(outcome.answer, "X won [A](https://a.example), see also ghost.");
        assert_eq!(outcome.cited_sources.len(), 1);
        assert_eq!(outcome.cited_sources[0].origin, "https://a.example");
        assert_eq!(outcome.sources_gathered, 2);
        assert_eq!(outcome.queries_dispatched, 1);
        assert_eq!(outcome.degradations.len(), 1);
    }

    #[tokio::test]
    async fn test_answer_failure_propagates() {
        let (gateway, agent) = setup(ScriptedProvider::new());
        let result = finalize(&gateway, &agent, state(), Instant::now()).await;
        assert!(matches!(result, Err(AgentError::RetriesExhausted { .. })));
    }
}
