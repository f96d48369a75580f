//! Research loop controller.
//!
//! Drives one request through the research state machine:
//! generating queries → gathering evidence → reflecting → (gathering
//! evidence | finalizing). Evidence rounds fan out one task per pending
//! sub-query and wait for all of them before reflecting. Query generation
//! and reflection degrade to fixed fallbacks on recoverable failures;
//! only fatal errors, cancellation and finalization failures reach the
//! caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::citation::rewrite_tokens;
use super::client::create_provider;
use super::config::AgentConfig;
use super::evidence::{DispatchContext, DispatchResult, EvidenceSource, build_source, gather};
use super::finalizer::finalize;
use super::gateway::LlmGateway;
use super::prompt::{PromptSet, current_date};
use super::query_writer::QueryWriterAgent;
use super::reflector::ReflectionAgent;
use super::schema::{Reflection, usable_queries};
use super::state::{
    EvidenceEntry, ResearchOutcome, ResearchRequest, ResearchState, Sufficiency, derive_topic,
};
use super::synthesizer::SynthesizerAgent;
use crate::error::AgentError;

/// Where the loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    GeneratingQueries,
    GatheringEvidence,
    Reflecting,
    Finalizing,
}

/// What to do after a reflection.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Next {
    Gather(Vec<String>),
    Finalize(&'static str),
}

/// Limits for one request, after per-request overrides.
#[derive(Debug, Clone, Copy)]
struct Limits {
    initial_query_count: usize,
    max_loops: u32,
}

/// Aborts spawned dispatches when a round is abandoned.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Runs research requests.
///
/// Cheap to share behind an `Arc`; concurrent requests share the gateway,
/// the evidence source and the dispatch limiter.
pub struct Orchestrator {
    config: AgentConfig,
    gateway: LlmGateway,
    source: Arc<dyn EvidenceSource>,
    prompts: PromptSet,
    dispatch_limiter: Arc<Semaphore>,
}

impl Orchestrator {
    /// Creates an orchestrator from its parts.
    #[must_use]
    pub fn new(
        config: AgentConfig,
        gateway: LlmGateway,
        source: Arc<dyn EvidenceSource>,
        prompts: PromptSet,
    ) -> Self {
        let dispatch_limiter = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            config,
            gateway,
            source,
            prompts,
            dispatch_limiter,
        }
    }

    /// Builds the provider, gateway, prompts and evidence source described
    /// by `config`.
    ///
    /// # Errors
    ///
    /// Returns fatal configuration errors: missing keys, unsupported
    /// providers, or a search mode whose settings are missing.
    pub fn from_config(config: AgentConfig) -> Result<Self, AgentError> {
        let provider = create_provider(&config)?;
        let gateway = LlmGateway::new(provider, &config);
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        let source = build_source(&config, &gateway, &prompts)?;
        info!(
            provider = gateway.provider_name(),
            source = source.name(),
            search_mode = %config.search_mode,
            "Research agent ready"
        );
        Ok(Self::new(config, gateway, source, prompts))
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Researches `request` to a cited answer.
    ///
    /// Stops early when `cancel` fires or the configured deadline passes;
    /// in-flight dispatches are abandoned and no partial result is kept.
    ///
    /// # Errors
    ///
    /// - [`AgentError::EmptyTopic`] when the request has no usable text
    /// - [`AgentError::Cancelled`] on cancellation or deadline
    /// - fatal gateway errors from any phase
    /// - any gateway error from the final answer call
    pub async fn research(
        &self,
        request: &ResearchRequest,
        cancel: &CancellationToken,
    ) -> Result<ResearchOutcome, AgentError> {
        let deadline = self.config.deadline;
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!("Research cancelled");
                Err(AgentError::Cancelled {
                    reason: "request cancelled".to_string(),
                })
            }
            () = expire(deadline) => {
                let secs = deadline.map_or(0.0, |d| d.as_secs_f64());
                warn!(deadline_secs = secs, "Research deadline exceeded");
                Err(AgentError::Cancelled {
                    reason: format!("deadline of {secs:.1}s exceeded"),
                })
            }
            result = self.run(request) => result,
        }
    }

    async fn run(&self, request: &ResearchRequest) -> Result<ResearchOutcome, AgentError> {
        let started = Instant::now();
        let mut state = ResearchState::new(derive_topic(&request.messages)?)?;
        let limits = Limits {
            initial_query_count: request
                .initial_query_count
                .unwrap_or(self.config.initial_query_count)
                .max(1),
            max_loops: request.max_loops.unwrap_or(self.config.max_loops).max(1),
        };
        let date: Arc<str> = Arc::from(current_date());
        info!(
            topic = %state.topic,
            initial_query_count = limits.initial_query_count,
            max_loops = limits.max_loops,
            "Research started"
        );

        let mut phase = Phase::GeneratingQueries;
        loop {
            debug!(?phase, loop_count = state.loop_count, "Entering phase");
            phase = match phase {
                Phase::GeneratingQueries => {
                    let queries = self
                        .generate_queries(&mut state, limits.initial_query_count, &date)
                        .await?;
                    state.pending_queries = queries;
                    Phase::GatheringEvidence
                }
                Phase::GatheringEvidence => {
                    self.gather_round(&mut state, &date).await;
                    Phase::Reflecting
                }
                Phase::Reflecting => {
                    let reflection = self.reflect(&mut state, limits.max_loops, &date).await?;
                    match decide(reflection, state.loop_count, limits) {
                        Next::Gather(queries) => {
                            info!(
                                loop_count = state.loop_count,
                                follow_ups = queries.len(),
                                "Evidence insufficient; gathering more"
                            );
                            state.pending_queries = queries;
                            Phase::GatheringEvidence
                        }
                        Next::Finalize(reason) => {
                            info!(loop_count = state.loop_count, reason, "Finalizing");
                            Phase::Finalizing
                        }
                    }
                }
                Phase::Finalizing => {
                    let synthesizer = SynthesizerAgent::new(&self.config, &self.prompts, &date);
                    return finalize(&self.gateway, &synthesizer, state, started).await;
                }
            };
        }
    }

    /// First-round sub-queries. Falls back to the topic itself.
    async fn generate_queries(
        &self,
        state: &mut ResearchState,
        count: usize,
        date: &str,
    ) -> Result<Vec<String>, AgentError> {
        let writer = QueryWriterAgent::new(&self.config, &self.prompts, date, count);
        match writer.generate(&self.gateway, &state.topic).await {
            Ok(list) if !list.query.is_empty() => {
                debug!(queries = ?list.query, rationale = %list.rationale, "Queries generated");
                Ok(list.query)
            }
            Ok(_) => {
                warn!("Query generation returned no usable queries; searching the topic");
                state.degradations.push(
                    "query generation returned no usable queries; used the topic".to_string(),
                );
                Ok(vec![state.topic.clone()])
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "Query generation failed; searching the topic");
                state
                    .degradations
                    .push(format!("query generation failed ({e}); used the topic"));
                Ok(vec![state.topic.clone()])
            }
        }
    }

    /// Dispatches every pending query concurrently and merges the results
    /// once all have finished. Appends exactly one entry per query.
    async fn gather_round(&self, state: &mut ResearchState, date: &Arc<str>) {
        let queries = std::mem::take(&mut state.pending_queries);
        let dispatched = queries.len();
        let ids = state.reserve_dispatch_ids(dispatched);
        state.rounds += 1;
        let round = state.rounds;
        info!(round, dispatches = dispatched, "Gathering evidence");

        let topic: Arc<str> = Arc::from(state.topic.as_str());
        let mut handles = Vec::with_capacity(queries.len());
        for (dispatch_id, query) in ids.clone().zip(queries.iter().cloned()) {
            let limiter = Arc::clone(&self.dispatch_limiter);
            let source = Arc::clone(&self.source);
            let ctx = DispatchContext::new(dispatch_id, Arc::clone(&topic), Arc::clone(date));
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = limiter.acquire().await else {
                    return DispatchResult::placeholder(
                        dispatch_id,
                        &query,
                        "dispatch limiter closed",
                    );
                };
                gather(source.as_ref(), &query, ctx).await
            }));
        }

        let abort_guard = AbortOnDrop(handles.iter().map(|h| h.abort_handle()).collect());
        let joined = join_all(handles).await;
        drop(abort_guard);

        let results: Vec<DispatchResult> = joined
            .into_iter()
            .zip(ids.zip(queries))
            .map(|(joined, (dispatch_id, query))| {
                joined.unwrap_or_else(|e| {
                    warn!(dispatch_id, error = %e, "Dispatch task failed");
                    DispatchResult::placeholder(
                        dispatch_id,
                        &query,
                        &format!("dispatch task failed: {e}"),
                    )
                })
            })
            .collect();

        let before = state.evidence_log.len();
        for result in results {
            merge_dispatch(state, round, result);
        }
        debug_assert_eq!(
            state.evidence_log.len() - before,
            dispatched,
            "round {round} must append one entry per dispatch"
        );
        info!(
            round,
            sources = state.sources_gathered.len(),
            failures = state.dispatch_failures,
            "Evidence round complete"
        );
    }

    /// Reflects on every round so far. Falls back to a verdict that only
    /// depends on the loop count.
    async fn reflect(
        &self,
        state: &mut ResearchState,
        max_loops: u32,
        date: &str,
    ) -> Result<Reflection, AgentError> {
        state.loop_count += 1;
        let agent = ReflectionAgent::new(&self.config, &self.prompts, date);
        let reflection = match agent
            .reflect(&self.gateway, &state.topic, &state.evidence_context())
            .await
        {
            Ok(reflection) => reflection,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(
                    loop_count = state.loop_count,
                    error = %e,
                    "Reflection failed; using fallback verdict"
                );
                state.degradations.push(format!(
                    "reflection {} failed ({e}); used fallback verdict",
                    state.loop_count
                ));
                Reflection {
                    is_sufficient: state.loop_count >= max_loops,
                    knowledge_gap: String::new(),
                    follow_up_queries: Vec::new(),
                }
            }
        };

        state.sufficiency = if reflection.is_sufficient {
            Sufficiency::Sufficient
        } else {
            Sufficiency::Insufficient
        };
        state.knowledge_gap.clone_from(&reflection.knowledge_gap);
        debug!(
            loop_count = state.loop_count,
            sufficient = reflection.is_sufficient,
            gap = %reflection.knowledge_gap,
            "Reflection complete"
        );
        Ok(reflection)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("gateway", &self.gateway)
            .field("source", &self.source.name())
            .finish_non_exhaustive()
    }
}

/// Merges one dispatch into the state, rewriting aliased tokens to their
/// canonical form.
fn merge_dispatch(state: &mut ResearchState, round: u32, result: DispatchResult) {
    let DispatchResult {
        dispatch_id,
        query,
        text,
        sources,
        failure,
    } = result;

    if let Some(reason) = &failure {
        state.dispatch_failures += 1;
        state.degradations.push(format!(
            "round {round}: dispatch {dispatch_id} for \"{query}\" degraded: {reason}"
        ));
    }

    let tokens: Vec<String> = sources.iter().map(|s| s.short_token.clone()).collect();
    let aliases = state.sources_gathered.merge(sources);
    let mut source_tokens: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        let canonical = aliases.get(&token).cloned().unwrap_or(token);
        if !source_tokens.contains(&canonical) {
            source_tokens.push(canonical);
        }
    }

    state.evidence_log.push(EvidenceEntry {
        round,
        dispatch_id,
        query,
        text: rewrite_tokens(&text, &aliases),
        source_tokens,
        degraded: failure.is_some(),
    });
}

/// Decision after a reflection.
fn decide(reflection: Reflection, loop_count: u32, limits: Limits) -> Next {
    if reflection.is_sufficient {
        return Next::Finalize("evidence sufficient");
    }
    if loop_count >= limits.max_loops {
        return Next::Finalize("loop limit reached");
    }
    let follow_ups = usable_queries(reflection.follow_up_queries, limits.initial_query_count);
    if follow_ups.is_empty() {
        Next::Finalize("no follow-up queries")
    } else {
        Next::Gather(follow_ups)
    }
}

async fn expire(deadline: Option<Duration>) {
    match deadline {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}
