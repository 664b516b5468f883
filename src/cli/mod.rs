//! CLI module for paxgate
//!
//! Provides command-line interface for:
//! - start: Set up a site, submit commands, shut down after draining
//! - check: Validate a configuration file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check, run, run_command, start};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{commands_from, read_commands, write_error, write_line, write_response};
