//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// scout-rs: iterative research agent.
///
/// Plans web, local-network or database searches for a question, gathers
/// evidence concurrently, reflects on what is missing, and writes a cited
/// answer.
#[derive(Parser, Debug)]
#[command(name = "scout-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (info-level logs on stderr).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Research a question and print a cited answer.
    ///
    /// Provider, models and search backend come from `SCOUT_*` environment
    /// variables; flags override them for this run.
    #[command(after_help = r#"Examples:
  scout-rs ask "What is the capital of France?"
  scout-rs ask "Latest Rust release notes" --max-loops 3
  scout-rs ask "Printer setup" --search-mode local_only --local-domain intranet.lan
  scout-rs ask "Top customers by revenue" --search-mode database --database ./shop.db
  scout-rs --format json ask "Who maintains tokio?" | jq '.cited_sources'
"#)]
    Ask {
        /// The question to research.
        question: String,

        /// Maximum reflection rounds.
        #[arg(long)]
        max_loops: Option<u32>,

        /// Sub-queries in the first round (also caps follow-up rounds).
        #[arg(long)]
        initial_queries: Option<usize>,

        /// Evidence backend (`internet_only`, `local_only`,
        /// `internet_then_local`, `local_then_internet`, `database`).
        #[arg(long)]
        search_mode: Option<String>,

        /// LLM provider (openai, openrouter, deepseek, gemini, ollama, lmstudio).
        #[arg(long)]
        provider: Option<String>,

        /// Model for every role (overrides `SCOUT_*_MODEL`).
        #[arg(long)]
        model: Option<String>,

        /// Local network host or URL to search. Repeatable.
        #[arg(long = "local-domain")]
        local_domains: Vec<String>,

        /// `SQLite` database for the database search mode.
        #[arg(long)]
        database: Option<PathBuf>,

        /// Directory containing prompt template files.
        #[arg(long)]
        prompt_dir: Option<PathBuf>,

        /// Give up after this many seconds.
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Show the effective configuration (secrets redacted).
    Config,

    /// Write the default prompt templates to a directory.
    ///
    /// Existing files are left untouched.
    #[command(after_help = r#"Examples:
  scout-rs init-prompts                     # Write to ~/.config/scout-rs/prompts/
  scout-rs init-prompts --dir ./my-prompts  # Write to custom directory
"#)]
    InitPrompts {
        /// Target directory for prompt templates.
        ///
        /// Defaults to `~/.config/scout-rs/prompts/`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}
