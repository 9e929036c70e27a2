//! CLI module for Granske.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Granske - Iterative Video Research
///
/// Researches a topic across YouTube videos and produces a markdown report
/// with timestamped citations. The name "Granske" comes from the
/// Norwegian/Scandinavian word for "investigate."
#[derive(Parser, Debug)]
#[command(name = "granske")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Research a topic and produce a cited markdown report
    Research {
        /// Research topic or question
        topic: String,

        /// Maximum search/assess passes (overrides config)
        #[arg(short = 'i', long)]
        max_iterations: Option<u32>,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Start MCP server for AI assistant integration (Claude, etc.)
    Mcp,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
