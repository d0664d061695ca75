//! CLI argument parsing for the ucdbg stream tool

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for dumped records
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// One human-readable line per record (default)
    Text,
    /// JSON lines for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "ucdbg")]
#[command(version)]
#[command(about = "Inspect concurrency trace streams captured by ucdbg", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a captured record stream
    Dump {
        /// File containing the 32-byte record stream
        file: PathBuf,

        /// Output format (text or json)
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,

        /// Print record counts instead of individual records
        #[arg(short = 'c', long = "summary")]
        summary: bool,
    },
}
