//! Output formatting for CLI commands.

use std::fmt::Write;

use serde::Serialize;

use crate::agent::config::AgentConfig;
use crate::agent::state::ResearchOutcome;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name. Unknown names fall back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes `value` as pretty JSON.
    #[must_use]
    pub fn to_json<T: Serialize>(self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| {
            serde_json::json!({ "error": format!("serialization failed: {e}") }).to_string()
        })
    }
}

/// Renders a research outcome as text: the answer, a numbered source
/// list, and a one-line run summary.
#[must_use]
pub fn format_outcome(outcome: &ResearchOutcome, verbose: bool) -> String {
    let mut out = outcome.answer.trim_end().to_string();
    out.push('\n');

    if !outcome.cited_sources.is_empty() {
        out.push_str("\nSources:\n");
        for (i, source) in outcome.cited_sources.iter().enumerate() {
            let _ = writeln!(out, "  [{}] {} - {}", i + 1, source.label, source.origin);
        }
    }

    let _ = write!(
        out,
        "\n---\nLoops: {} | Rounds: {} | Queries: {} ({} failed) | Sources: {} cited of {} | Time: {:.1}s\n",
        outcome.loop_count,
        outcome.rounds,
        outcome.queries_dispatched,
        outcome.dispatch_failures,
        outcome.cited_sources.len(),
        outcome.sources_gathered,
        outcome.elapsed.as_secs_f64()
    );

    if verbose {
        if !outcome.knowledge_gap.is_empty() {
            let _ = writeln!(out, "Knowledge gap: {}", outcome.knowledge_gap);
        }
        for note in &outcome.degradations {
            let _ = writeln!(out, "Degraded: {note}");
        }
    }
    out
}

/// Effective configuration without secrets.
#[derive(Debug, Serialize)]
pub struct ConfigView<'a> {
    provider: &'a str,
    base_url: &'a str,
    api_key_set: bool,
    query_model: &'a str,
    reflection_model: &'a str,
    answer_model: &'a str,
    fallback_model: Option<&'a str>,
    initial_query_count: usize,
    max_loops: u32,
    max_concurrency: usize,
    timeout_secs: u64,
    max_retries: u32,
    search_mode: &'a str,
    search_base_url: &'a str,
    search_api_key_set: bool,
    search_results: usize,
    local_search_domains: &'a [String],
    database_path: Option<String>,
    prompt_dir: Option<String>,
    deadline_secs: Option<u64>,
}

impl<'a> ConfigView<'a> {
    /// View of `config`.
    #[must_use]
    pub fn new(config: &'a AgentConfig) -> Self {
        Self {
            provider: config.provider.as_str(),
            base_url: config.effective_base_url(),
            api_key_set: !config.api_key.is_empty(),
            query_model: &config.query_model,
            reflection_model: &config.reflection_model,
            answer_model: &config.answer_model,
            fallback_model: config.fallback_model.as_deref(),
            initial_query_count: config.initial_query_count,
            max_loops: config.max_loops,
            max_concurrency: config.max_concurrency,
            timeout_secs: config.timeout.as_secs(),
            max_retries: config.max_retries,
            search_mode: config.search_mode.as_str(),
            search_base_url: &config.search_base_url,
            search_api_key_set: config
                .search_api_key
                .as_deref()
                .is_some_and(|k| !k.trim().is_empty()),
            search_results: config.search_results,
            local_search_domains: &config.local_search_domains,
            database_path: config
                .database_path
                .as_ref()
                .map(|p| p.display().to_string()),
            prompt_dir: config.prompt_dir.as_ref().map(|p| p.display().to_string()),
            deadline_secs: config.deadline.map(|d| d.as_secs()),
        }
    }

    /// Renders the view as `key = value` lines.
    #[must_use]
    pub fn to_text(&self) -> String {
        let yes_no = |b: bool| if b { "set" } else { "unset" };
        let mut out = String::new();
        let _ = writeln!(out, "provider             = {}", self.provider);
        let _ = writeln!(out, "base_url             = {}", self.base_url);
        let _ = writeln!(out, "api_key              = {}", yes_no(self.api_key_set));
        let _ = writeln!(out, "query_model          = {}", self.query_model);
        let _ = writeln!(out, "reflection_model     = {}", self.reflection_model);
        let _ = writeln!(out, "answer_model         = {}", self.answer_model);
        let _ = writeln!(
            out,
            "fallback_model       = {}",
            self.fallback_model.unwrap_or("-")
        );
        let _ = writeln!(out, "initial_query_count  = {}", self.initial_query_count);
        let _ = writeln!(out, "max_loops            = {}", self.max_loops);
        let _ = writeln!(out, "max_concurrency      = {}", self.max_concurrency);
        let _ = writeln!(out, "timeout_secs         = {}", self.timeout_secs);
        let _ = writeln!(out, "max_retries          = {}", self.max_retries);
        let _ = writeln!(out, "search_mode          = {}", self.search_mode);
        let _ = writeln!(out, "search_base_url      = {}", self.search_base_url);
        let _ = writeln!(
            out,
            "search_api_key       = {}",
            yes_no(self.search_api_key_set)
        );
        let _ = writeln!(out, "search_results       = {}", self.search_results);
        let _ = writeln!(
            out,
            "local_search_domains = {}",
            self.local_search_domains.join(", ")
        );
        let _ = writeln!(
            out,
            "database_path        = {}",
            self.database_path.as_deref().unwrap_or("-")
        );
        let _ = writeln!(
            out,
            "prompt_dir           = {}",
            self.prompt_dir.as_deref().unwrap_or("-")
        );
        let _ = writeln!(
            out,
            "deadline_secs        = {}",
            self.deadline_secs.map_or_else(|| "-".to_string(), |s| s.to_string())
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::agent::citation::SourceRecord;

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("yaml"), OutputFormat::Text);
    }

    #[test]
    fn test_format_outcome_lists_sources() {
        let outcome = ResearchOutcome {
            answer: "Paris [Paris](https://paris.example).".to_string(),
            cited_sources: vec![SourceRecord {
                short_token: "cite://0-1".to_string(),
                origin: "https://paris.example".to_string(),
                label: "Paris".to_string(),
                snippet: String::new(),
            }],
            topic: "capital".to_string(),
            loop_count: 1,
            rounds: 1,
            queries_dispatched: 1,
            dispatch_failures: 0,
            sources_gathered: 3,
            degradations: vec!["reflection 1 failed".to_string()],
            knowledge_gap: String::new(),
            elapsed: Duration::from_millis(1500),
        };
        let text = format_outcome(&outcome, false);
        assert!(text.contains("  [1] Paris - https://paris.example"));
        assert!(text.contains("Sources: 1 cited of 3"));
        assert!(!text.contains("Degraded"));
        assert!(format_outcome(&outcome, true).contains("Degraded: reflection 1 failed"));
    }

    #[test]
    fn test_config_view_hides_secrets() {
        let config = AgentConfig::builder()
            .api_key("sk-secret")
            .search_api_key("exa-secret")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let view = ConfigView::new(&config);
        let text = view.to_text();
        let json = OutputFormat::Json.to_json(&view);
        assert!(!text.contains("secret") && !json.contains("secret"));
        assert!(text.contains("api_key              = set"));
        assert!(json.contains("\"api_key_set\": true"));
    }
}
