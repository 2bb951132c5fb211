//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Halldyll - Declarative Fargate service provisioning.
#[derive(Parser, Debug)]
#[command(name = "halldyll-fargate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "HALLDYLL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the service configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show the steps a deploy would perform.
    Plan {
        /// Show the reason for every step.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Create or update the service and its network.
    Deploy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Refresh and show the service's tasks.
    Status,

    /// Tear down the service and its network.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage state backend.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show current state.
    Show,

    /// Lock the state.
    Lock {
        /// Lock holder identifier.
        #[arg(long)]
        holder: Option<String>,
    },

    /// Unlock the state.
    Unlock {
        /// Lock ID to unlock.
        #[arg(long)]
        lock_id: Option<String>,

        /// Force unlock (dangerous).
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deploy() {
        let cli = Cli::try_parse_from(["halldyll-fargate", "deploy", "--yes"]).expect("parses");
        assert!(matches!(cli.command, Commands::Deploy { yes: true }));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_state_unlock() {
        let cli = Cli::try_parse_from([
            "halldyll-fargate",
            "-c",
            "svc.yaml",
            "state",
            "unlock",
            "--force",
        ])
        .expect("parses");

        assert_eq!(cli.config, Some(PathBuf::from("svc.yaml")));
        assert!(matches!(
            cli.command,
            Commands::State {
                command: StateCommands::Unlock { force: true, .. }
            }
        ));
    }
}
