//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Who may operate the server
    #[serde(default)]
    pub access: RawAccessConfig,

    /// Allowed run and extension lengths
    #[serde(default)]
    pub schedule: RawScheduleConfig,

    /// Polling cadence, timeouts and delays
    #[serde(default)]
    pub timings: RawTimings,

    /// Cloud resource to control
    pub resource: RawResourceConfig,

    /// Game-server daemon manager
    pub daemon: RawDaemonConfig,

    /// Chat notifications
    #[serde(default)]
    pub notify: RawNotifyConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/underlampd/underlampd.sock)
    pub socket_path: Option<PathBuf>,

    /// Data directory for the audit log
    pub data_dir: Option<PathBuf>,

    /// Name of the managed server, used in notifications
    pub instance_name: Option<String>,
}

/// Access list
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawAccessConfig {
    #[serde(default)]
    pub operators: Vec<RawOperator>,

    /// Operator IDs allowed to grant access to others
    #[serde(default)]
    pub admins: Vec<String>,

    /// Lifetime of a verification code (default: 300)
    pub code_ttl_seconds: Option<u64>,

    /// Verification codes an operator may be issued per hour (default: 5)
    pub code_requests_per_hour: Option<u32>,
}

/// One operator on the access list
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawOperator {
    /// Stable identity, typically an email address
    pub id: String,

    /// Display name used in notifications
    pub name: Option<String>,
}

/// Allowed minute values
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawScheduleConfig {
    /// Allowed run lengths for a start request (default: [30, 60, 90, 120])
    pub start_minutes: Option<Vec<u32>>,

    /// Allowed extension lengths (default: [30, 60])
    pub extend_minutes: Option<Vec<u32>>,
}

/// Timing overrides, all in seconds
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTimings {
    pub poll_interval_seconds: Option<u64>,
    pub resource_boot_timeout_seconds: Option<u64>,
    pub resource_stop_timeout_seconds: Option<u64>,
    pub daemon_boot_timeout_seconds: Option<u64>,
    /// Wait between the resource coming up and starting the daemon
    pub settle_delay_seconds: Option<u64>,
    /// Wait between the graceful daemon stop and the forced kill
    pub daemon_stop_grace_seconds: Option<u64>,
    /// Wait between the daemon going down and stopping the resource
    pub pre_resource_stop_delay_seconds: Option<u64>,
}

/// Aliyun ECS instance, driven through the `aliyun` CLI
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawResourceConfig {
    pub region_id: String,
    pub instance_id: String,

    /// Path to the `aliyun` binary (default: looked up on PATH)
    pub cli_path: Option<PathBuf>,

    /// CLI credential profile
    pub profile: Option<String>,
}

/// MCSManager panel holding the game-server instance
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawDaemonConfig {
    pub base_url: String,
    pub api_key: String,
    pub daemon_id: String,
    pub instance_uuid: String,

    /// Per-request timeout (default: 10)
    pub request_timeout_seconds: Option<u64>,
}

/// Chat webhook
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawNotifyConfig {
    /// Markdown webhook URL; notifications are only logged when unset
    pub webhook_url: Option<String>,

    /// Per-message timeout (default: 5)
    pub timeout_seconds: Option<u64>,
}
