//! CLI layer for scout-rs.
//!
//! Provides the command-line interface using clap, with commands for
//! researching a question, showing configuration, and exporting prompts.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
