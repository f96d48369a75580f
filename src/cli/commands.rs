//! CLI command implementations.
//!
//! Each command returns its rendered output; `main` does the printing.

use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::agent::config::AgentConfig;
use crate::agent::orchestrator::Orchestrator;
use crate::agent::prompt::PromptSet;
use crate::agent::state::ResearchRequest;
use crate::cli::output::{ConfigView, OutputFormat, format_outcome};
use crate::cli::parser::{Cli, Commands};
use crate::error::{CommandError, Result};

/// Parameters for the ask command.
#[derive(Debug, Clone, Default)]
pub struct AskParams<'a> {
    /// The question to research.
    pub question: &'a str,
    /// Reflection round limit override.
    pub max_loops: Option<u32>,
    /// First-round query count override.
    pub initial_queries: Option<usize>,
    /// Evidence backend name.
    pub search_mode: Option<&'a str>,
    /// LLM provider name.
    pub provider: Option<&'a str>,
    /// Model used for every role.
    pub model: Option<&'a str>,
    /// Local network hosts.
    pub local_domains: &'a [String],
    /// `SQLite` database path.
    pub database: Option<&'a Path>,
    /// Prompt template directory.
    pub prompt_dir: Option<&'a Path>,
    /// Overall deadline in seconds.
    pub deadline_secs: Option<u64>,
    /// Include degradations in text output.
    pub verbose: bool,
}

/// Executes the parsed command and returns its output.
///
/// # Errors
///
/// Returns an error if configuration fails or the command itself fails.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Ask {
            question,
            max_loops,
            initial_queries,
            search_mode,
            provider,
            model,
            local_domains,
            database,
            prompt_dir,
            deadline_secs,
        } => {
            let params = AskParams {
                question,
                max_loops: *max_loops,
                initial_queries: *initial_queries,
                search_mode: search_mode.as_deref(),
                provider: provider.as_deref(),
                model: model.as_deref(),
                local_domains,
                database: database.as_deref(),
                prompt_dir: prompt_dir.as_deref(),
                deadline_secs: *deadline_secs,
                verbose: cli.verbose,
            };
            cmd_ask(&params, format)
        }
        Commands::Config => cmd_config(format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

/// Environment configuration with the ask flags layered on top.
fn ask_config(params: &AskParams<'_>) -> Result<AgentConfig> {
    // Provider first: it decides which key variable from_env reads.
    let mut builder = AgentConfig::builder();
    if let Some(provider) = params.provider {
        builder = builder.provider(provider);
    }
    if let Some(model) = params.model {
        builder = builder
            .query_model(model)
            .reflection_model(model)
            .answer_model(model);
    }
    if let Some(mode) = params.search_mode {
        builder = builder.search_mode(mode);
    }
    if !params.local_domains.is_empty() {
        builder = builder.local_search_domains(params.local_domains.to_vec());
    }
    if let Some(path) = params.database {
        builder = builder.database_path(path);
    }
    if let Some(dir) = params.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    if let Some(secs) = params.deadline_secs {
        builder = builder.deadline(Duration::from_secs(secs));
    }

    builder.from_env().build().map_err(|e| {
        CommandError::ExecutionFailed(format!("Agent configuration error: {e}")).into()
    })
}

fn cmd_ask(params: &AskParams<'_>, format: OutputFormat) -> Result<String> {
    if params.max_loops == Some(0) {
        return Err(
            CommandError::InvalidArgument("--max-loops must be at least 1".to_string()).into(),
        );
    }
    if params.initial_queries == Some(0) {
        return Err(
            CommandError::InvalidArgument("--initial-queries must be at least 1".to_string())
                .into(),
        );
    }
    let config = ask_config(params)?;

    let mut request = ResearchRequest::new(params.question);
    if let Some(n) = params.initial_queries {
        request = request.with_initial_query_count(n);
    }
    if let Some(n) = params.max_loops {
        request = request.with_max_loops(n);
    }

    // Create tokio runtime as sync/async bridge
    let rt = tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}"))
    })?;

    let result = rt.block_on(async {
        let orchestrator = Orchestrator::from_config(config)?;
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling research");
                on_interrupt.cancel();
            }
        });
        let outcome = orchestrator.research(&request, &cancel).await;
        interrupt.abort();
        outcome
    });

    match result {
        Ok(outcome) => match format {
            OutputFormat::Text => Ok(format_outcome(&outcome, params.verbose)),
            OutputFormat::Json => Ok(format.to_json(&outcome)),
        },
        Err(e) => Err(CommandError::ExecutionFailed(format!("Research failed: {e}")).into()),
    }
}

fn cmd_config(format: OutputFormat) -> Result<String> {
    let config = AgentConfig::builder().from_env().build().map_err(|e| {
        CommandError::ExecutionFailed(format!("Agent configuration error: {e}"))
    })?;
    let view = ConfigView::new(&config);
    Ok(match format {
        OutputFormat::Text => view.to_text(),
        OutputFormat::Json => format.to_json(&view),
    })
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text if written.is_empty() => Ok(format!(
            "All prompt templates already exist in: {}\n",
            target_dir.display()
        )),
        OutputFormat::Text => {
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown");
                let _ = writeln!(output, "  {name}");
            }
            output.push_str(
                "\nEdit these files to change what each research step asks the model.\n",
            );
            Ok(output)
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_prompts_writes_once() {
        let temp = TempDir::new().unwrap_or_else(|_| unreachable!());
        let first = cmd_init_prompts(Some(temp.path()), OutputFormat::Text)
            .unwrap_or_else(|_| unreachable!());
        assert!(first.contains("Wrote 5 prompt template(s)"));
        assert!(first.contains("query_writer.md"));
        assert!(temp.path().join("sql_planner.md").exists());

        let second = cmd_init_prompts(Some(temp.path()), OutputFormat::Json)
            .unwrap_or_else(|_| unreachable!());
        assert!(second.contains("\"count\": 0"));
    }

    #[test]
    fn test_ask_config_applies_flags() {
        let domains = vec!["intranet.lan".to_string()];
        let params = AskParams {
            question: "q",
            provider: Some("ollama"),
            model: Some("llama3"),
            search_mode: Some("local_only"),
            local_domains: &domains,
            deadline_secs: Some(30),
            ..AskParams::default()
        };
        let config = ask_config(&params).unwrap_or_else(|_| unreachable!());
        assert_eq!(config.query_model, "llama3");
        assert_eq!(config.reflection_model, "llama3");
        assert_eq!(config.answer_model, "llama3");
        assert_eq!(config.local_search_domains, domains);
        assert_eq!(config.deadline, Some(Duration::from_secs(30)));
        assert_eq!(config.search_mode.as_str(), "local_only");
    }

    #[test]
    fn test_ask_rejects_zero_limits() {
        let params = AskParams {
            question: "q",
            max_loops: Some(0),
            ..AskParams::default()
        };
        let result = cmd_ask(&params, OutputFormat::Text);
        assert!(matches!(
            result,
            Err(crate::error::Error::Command(CommandError::InvalidArgument(_)))
        ));
    }

    #[test]
    fn test_ask_config_rejects_unknown_mode() {
        let params = AskParams {
            question: "q",
            provider: Some("ollama"),
            search_mode: Some("carrier_pigeon"),
            ..AskParams::default()
        };
        assert!(ask_config(&params).is_err());
    }
}
