//! Node Configuration
//!
//! One JSON file per site. Everything except `site.name`, `site.id` and
//! `site.port` has a default. The configuration is read once at startup
//! and never changes afterwards.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::{CommandCodec, FramePolicy};
use crate::control::CONTROL_PORT_DELTA;
use crate::observability::Severity;
use crate::pool::{CoordinatorConfig, MAX_COORDINATORS};
use crate::protocol::{LocaleId, PartitionId, SiteId, LEADER_LOCALE};
use crate::rpc::ServerThreads;
use crate::worker::{HostError, HostResult};

/// Identity and address of this site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteInfo {
    /// Human-readable site name, used in logs and the control endpoint
    pub name: String,

    /// Cluster-wide site id
    pub id: SiteId,

    /// Partition the site belongs to (default: 0)
    #[serde(default)]
    pub partition_id: PartitionId,

    /// Role within the partition; 0 is the leader (default: 0)
    #[serde(default)]
    pub locale_id: LocaleId,

    /// Host the RPC server binds to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the RPC server binds to
    pub port: u16,
}

/// Supervisor heartbeat settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Start the control server on `port + 10000` (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// How long a heartbeat keeps the site supervised (default: 5000)
    #[serde(default = "default_ctrl_timeout_ms")]
    pub ctrl_timeout_ms: u64,
}

/// Complete configuration of one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Site identity and address
    pub site: SiteInfo,

    /// Supervisor heartbeat
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// IO threads of each server runtime (default: 1)
    #[serde(default = "default_threads")]
    pub io_threads: usize,

    /// Worker threads of each server runtime (default: 1)
    #[serde(default = "default_threads")]
    pub worker_threads: usize,

    /// Payload framing (default: "exact")
    #[serde(default)]
    pub frame_policy: FramePolicy,

    /// Upper bound on coordinators (default: 65535)
    #[serde(default = "default_max_coordinators")]
    pub max_coordinators: usize,

    /// Minimum log severity (default: "info")
    #[serde(default)]
    pub log_level: Severity,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_ctrl_timeout_ms() -> u64 {
    5000
}

fn default_threads() -> usize {
    1
}

fn default_max_coordinators() -> usize {
    MAX_COORDINATORS
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ctrl_timeout_ms: default_ctrl_timeout_ms(),
        }
    }
}

impl NodeConfig {
    /// Create a leader configuration with defaults for everything else.
    pub fn new(name: impl Into<String>, id: SiteId, port: u16) -> Self {
        Self {
            site: SiteInfo {
                name: name.into(),
                id,
                partition_id: 0,
                locale_id: LEADER_LOCALE,
                host: default_host(),
                port,
            },
            heartbeat: HeartbeatConfig::default(),
            io_threads: default_threads(),
            worker_threads: default_threads(),
            frame_policy: FramePolicy::default(),
            max_coordinators: default_max_coordinators(),
            log_level: Severity::default(),
        }
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> HostResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            HostError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a configuration document.
    pub fn from_json(text: &str) -> HostResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| HostError::configuration(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> HostResult<()> {
        if self.site.name.trim().is_empty() {
            return Err(HostError::configuration("site.name must not be empty"));
        }
        if self.site.host.trim().is_empty() {
            return Err(HostError::configuration("site.host must not be empty"));
        }
        if self.io_threads == 0 || self.worker_threads == 0 {
            return Err(HostError::configuration(
                "io_threads and worker_threads must be at least 1",
            ));
        }
        if self.max_coordinators == 0 || self.max_coordinators > MAX_COORDINATORS {
            return Err(HostError::configuration(format!(
                "max_coordinators must be between 1 and {}",
                MAX_COORDINATORS
            )));
        }
        if self.heartbeat.enabled && self.control_port().is_none() {
            return Err(HostError::configuration(format!(
                "site.port {} leaves no room for the control port (port + {})",
                self.site.port, CONTROL_PORT_DELTA
            )));
        }
        Ok(())
    }

    /// Whether this site originates submissions.
    pub fn is_leader(&self) -> bool {
        self.site.locale_id == LEADER_LOCALE
    }

    /// Address of the RPC server.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.site.host, self.site.port)
    }

    /// Port of the control server, if it fits in a `u16`.
    pub fn control_port(&self) -> Option<u16> {
        self.site.port.checked_add(CONTROL_PORT_DELTA)
    }

    /// Address of the control server. Listens on every interface.
    pub fn control_address(&self) -> Option<String> {
        self.control_port().map(|port| format!("0.0.0.0:{}", port))
    }

    /// Heartbeat window of the control service.
    pub fn ctrl_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat.ctrl_timeout_ms)
    }

    /// Thread counts of each server runtime.
    pub fn server_threads(&self) -> ServerThreads {
        ServerThreads {
            io_threads: self.io_threads,
            worker_threads: self.worker_threads,
        }
    }

    /// Codec for the configured frame policy.
    pub fn codec(&self) -> CommandCodec {
        CommandCodec::new(self.frame_policy)
    }

    /// Settings every coordinator is created with.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            partition_id: self.site.partition_id,
            locale_id: self.site.locale_id,
            codec: self.codec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::HostErrorKind;

    #[test]
    fn test_minimal_document_uses_defaults() {
        let config =
            NodeConfig::from_json(r#"{"site": {"name": "site-0", "id": 0, "port": 7000}}"#)
                .unwrap();
        assert_eq!(config.site.host, "0.0.0.0");
        assert_eq!(config.site.locale_id, 0);
        assert!(!config.heartbeat.enabled);
        assert_eq!(config.heartbeat.ctrl_timeout_ms, 5000);
        assert_eq!(config.io_threads, 1);
        assert_eq!(config.frame_policy, FramePolicy::Exact);
        assert_eq!(config.max_coordinators, MAX_COORDINATORS);
        assert_eq!(config.log_level, Severity::Info);
        assert!(config.is_leader());
    }

    #[test]
    fn test_full_document() {
        let config = NodeConfig::from_json(
            r#"{
                "site": {"name": "site-2", "id": 2, "partition_id": 1, "locale_id": 2,
                         "host": "127.0.0.1", "port": 7002},
                "heartbeat": {"enabled": true, "ctrl_timeout_ms": 250},
                "io_threads": 2,
                "worker_threads": 4,
                "frame_policy": "nul_terminated",
                "max_coordinators": 16,
                "log_level": "warn"
            }"#,
        )
        .unwrap();
        assert!(!config.is_leader());
        assert_eq!(config.bind_address(), "127.0.0.1:7002");
        assert_eq!(config.control_address().as_deref(), Some("0.0.0.0:17002"));
        assert_eq!(config.ctrl_timeout(), Duration::from_millis(250));
        assert_eq!(config.server_threads().worker_threads, 4);
        assert_eq!(config.codec().policy(), FramePolicy::NulTerminated);
        assert_eq!(config.coordinator_config().partition_id, 1);
    }

    #[test]
    fn test_rejects_empty_name() {
        let err = NodeConfig::from_json(r#"{"site": {"name": " ", "id": 0, "port": 7000}}"#)
            .unwrap_err();
        assert_eq!(err.kind, HostErrorKind::Configuration);
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = NodeConfig::from_json("{").unwrap_err();
        assert_eq!(err.kind, HostErrorKind::Configuration);
    }

    #[test]
    fn test_rejects_zero_threads() {
        let mut config = NodeConfig::new("site-0", 0, 7000);
        config.io_threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_coordinator_bound_out_of_range() {
        let mut config = NodeConfig::new("site-0", 0, 7000);
        config.max_coordinators = 0;
        assert!(config.validate().is_err());
        config.max_coordinators = MAX_COORDINATORS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_heartbeat_needs_room_for_control_port() {
        let mut config = NodeConfig::new("site-0", 0, 60000);
        assert!(config.validate().is_ok());
        config.heartbeat.enabled = true;
        assert!(config.validate().is_err());
        assert!(config.control_address().is_none());
    }

    #[test]
    fn test_missing_file() {
        let err = NodeConfig::load(Path::new("/nonexistent/paxgate.json")).unwrap_err();
        assert_eq!(err.kind, HostErrorKind::Configuration);
    }
}
