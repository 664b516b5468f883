//! CLI command implementations
//!
//! `start` runs one site on the in-process protocol: it sets the worker up,
//! submits commands, and shuts down once every submission was learned.
//! `check` validates a configuration file without starting anything.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::NodeConfig;
use crate::observability::Logger;
use crate::protocol::local::LocalProtocol;
use crate::worker::{HostResult, ReplicationWorker, Submission};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{read_commands, write_error, write_response};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

/// Run one parsed command
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Start { config, example } => start(&config, example),
        Command::Check { config } => check(&config),
    }
}

/// Validate a configuration file and print the resolved settings
pub fn check(config_path: &Path) -> CliResult<()> {
    let config = NodeConfig::load(config_path)?;
    write_response(config_summary(&config))
}

/// Start a site.
///
/// With `example`, submits `"abc\0"` once. Otherwise submits every stdin
/// line until EOF. When the heartbeat is enabled the site then keeps
/// serving until shutdown is requested through the control endpoint.
pub fn start(config_path: &Path, example: bool) -> CliResult<()> {
    let config = NodeConfig::load(config_path)?;
    Logger::set_min_severity(config.log_level);
    let heartbeat = config.heartbeat.enabled;

    let mut worker = ReplicationWorker::new(config, Arc::new(LocalProtocol::new()));
    worker.register_apply_callback(|payload| {
        let learned = json!({
            "learned": String::from_utf8_lossy(payload),
            "bytes": payload.len(),
        });
        let _ = write_response(learned);
    });
    if let Err(e) = worker.setup().and_then(|_| worker.start()) {
        let _ = worker.shutdown();
        return Err(e.into());
    }

    if example {
        report(worker.submit_example())?;
    } else {
        for command in read_commands() {
            report(worker.submit(&command?))?;
        }
    }
    worker.drain();

    if heartbeat {
        worker.block_until_shutdown_requested(None);
    }
    worker
        .shutdown()
        .map_err(|e| CliError::shutdown_failed(e.to_string()))?;
    write_response(json!({ "stopped": true, "metrics": worker.metrics().snapshot() }))
}

fn report(result: HostResult<Submission>) -> CliResult<()> {
    match result {
        Ok(submission) => write_response(json!({ "coordinator_id": submission.coordinator_id })),
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => write_error(&format!("{:?}", e.kind), &e.message),
    }
}

fn config_summary(config: &NodeConfig) -> Value {
    let control_address = if config.heartbeat.enabled {
        config.control_address()
    } else {
        None
    };
    json!({
        "site": config.site.name,
        "site_id": config.site.id,
        "partition_id": config.site.partition_id,
        "locale_id": config.site.locale_id,
        "leader": config.is_leader(),
        "rpc_address": config.bind_address(),
        "control_address": control_address,
        "frame_policy": config.frame_policy,
        "max_coordinators": config.max_coordinators,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_check_accepts_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"site": {{"name": "site-0", "id": 0, "port": 7000}}}}"#).unwrap();
        assert!(check(file.path()).is_ok());
    }

    #[test]
    fn test_check_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"site": {{"name": "", "id": 0, "port": 7000}}}}"#).unwrap();
        let err = check(file.path()).unwrap_err();
        assert_eq!(err.code_str(), "PAXGATE_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_summary_hides_control_address_without_heartbeat() {
        let config = NodeConfig::new("site-0", 0, 7000);
        let summary = config_summary(&config);
        assert_eq!(summary["leader"], true);
        assert_eq!(summary["frame_policy"], "exact");
        assert!(summary["control_address"].is_null());
    }

    #[test]
    fn test_start_example_runs_to_completion() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"site": {{"name": "site-0", "id": 0, "host": "127.0.0.1", "port": 0}}}}"#
        )
        .unwrap();
        assert!(start(file.path(), true).is_ok());
    }
}
