//! CLI module for the Halldyll deployment tool.
//!
//! This module provides the command-line interface for provisioning
//! Fargate services.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
