// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Command-line arguments

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "aqlexec", version, about = "Run AQL execution plans against JSON data")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<log::Level>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a plan and print its result
    Run(RunArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Plan file (JSON)
    #[arg(long)]
    pub plan: PathBuf,

    /// Data file with collections and indexes (JSON)
    #[arg(long)]
    pub data: PathBuf,

    /// Report the number of rows the query would return without its limit
    #[arg(long)]
    pub full_count: bool,

    /// Collect per-node statistics (none, basic, blocks)
    #[arg(long, num_args = 0..=1, default_missing_value = "basic")]
    pub profile: Option<String>,

    /// Memory limit of the query in bytes
    #[arg(long)]
    pub memory_limit: Option<u64>,

    /// Rows per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "aqlexec", "run", "--plan", "p.json", "--data", "d.json", "--full-count", "--profile",
            "--format", "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert!(args.full_count);
                assert_eq!(args.profile.as_deref(), Some("basic"));
                assert_eq!(args.format, OutputFormat::Json);
                assert_eq!(args.memory_limit, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_log_level() {
        let cli = Cli::try_parse_from(["aqlexec", "version", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level, Some(log::Level::Debug));
        assert!(Cli::try_parse_from(["aqlexec", "run", "--plan", "p.json"]).is_err());
    }
}
