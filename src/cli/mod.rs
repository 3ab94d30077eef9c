//! CLI module for idlinker - command-line interface and subcommands.
//!
//! Provides the main entry point with the `enrich` (default) and
//! `candidates` subcommands.

pub mod commands;

pub use commands::{Cli, Commands, RunArgs};
