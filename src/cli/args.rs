//! CLI argument definitions using clap
//!
//! Commands:
//! - paxgate start --config <path> [--example]
//! - paxgate check --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// paxgate - host-side orchestration for a Paxos replicated command log
#[derive(Parser, Debug)]
#[command(name = "paxgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a site and submit commands read from stdin, one per line
    Start {
        /// Path to configuration file
        #[arg(long, default_value = "./paxgate.json")]
        config: PathBuf,

        /// Submit the example command instead of reading stdin
        #[arg(long)]
        example: bool,
    },

    /// Validate a configuration file and print the resolved settings
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./paxgate.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
