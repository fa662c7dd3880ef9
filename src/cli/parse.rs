//! CLI parse: clap types for querypipe. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// querypipe - run GraphQL operations through the plugin pipeline
#[derive(Parser, Debug)]
#[command(name = "querypipe")]
#[command(about = "Run GraphQL operations through a pluggable execution pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root searched for querypipe.toml
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Configuration file path (replaces querypipe.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Endpoint URL (overrides configuration)
    #[arg(long)]
    pub url: Option<String>,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a query or mutation and print the normalized result as JSON
    Run {
        /// Operation text
        #[arg(long, conflicts_with = "file")]
        query: Option<String>,

        /// Read the operation text from a file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Variable as name=value; values are parsed as JSON, falling back to a string
        #[arg(long = "var")]
        vars: Vec<String>,

        /// Cache policy (cache-first, cache-only, network-only, cache-and-network)
        #[arg(long)]
        policy: Option<String>,

        /// Operation kind
        #[arg(long, value_enum, default_value = "query")]
        kind: OperationKindArg,

        /// Extra request header as name:value
        #[arg(long = "header")]
        headers: Vec<String>,
    },
    /// Print the operation key for a query and its variables
    Key {
        #[arg(long, conflicts_with = "file")]
        query: Option<String>,

        #[arg(long)]
        file: Option<PathBuf>,

        #[arg(long = "var")]
        vars: Vec<String>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKindArg {
    Query,
    Mutation,
}
