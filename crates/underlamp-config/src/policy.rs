//! Validated configuration structures

use crate::schema::{
    RawAccessConfig, RawConfig, RawDaemonConfig, RawNotifyConfig, RawResourceConfig,
    RawScheduleConfig, RawServiceConfig, RawTimings,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Run lengths accepted by a start request when none are configured
pub const DEFAULT_START_MINUTES: &[u32] = &[30, 60, 90, 120];

/// Extension lengths accepted when none are configured
pub const DEFAULT_EXTEND_MINUTES: &[u32] = &[30, 60];

const DEFAULT_CODE_TTL_SECS: u64 = 300;
const DEFAULT_CODE_REQUESTS_PER_HOUR: u32 = 5;
const DEFAULT_INSTANCE_NAME: &str = "game server";

/// Validated configuration ready for use by the service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service: ServiceSettings,
    pub access: AccessPolicy,
    pub schedule: Schedule,
    pub timings: Timings,
    pub resource: ResourceConfig,
    pub daemon: DaemonConfig,
    pub notify: NotifyConfig,
}

impl ServiceConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceSettings::from_raw(raw.service),
            access: AccessPolicy::from_raw(raw.access),
            schedule: Schedule::from_raw(raw.schedule),
            timings: Timings::from_raw(&raw.timings),
            resource: ResourceConfig::from_raw(raw.resource),
            daemon: DaemonConfig::from_raw(raw.daemon),
            notify: NotifyConfig::from_raw(raw.notify),
        }
    }
}

/// Paths and naming
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub instance_name: String,
}

impl ServiceSettings {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(underlamp_util::default_socket_path),
            data_dir: raw
                .data_dir
                .unwrap_or_else(underlamp_util::default_data_dir),
            instance_name: raw
                .instance_name
                .unwrap_or_else(|| DEFAULT_INSTANCE_NAME.to_string()),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// An operator allowed to request lifecycle operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub id: String,
    pub display_name: String,
}

/// Access list and verification code policy
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    pub operators: Vec<Operator>,
    pub admins: HashSet<String>,
    pub code_ttl: Duration,
    pub code_requests_per_hour: u32,
}

impl AccessPolicy {
    fn from_raw(raw: RawAccessConfig) -> Self {
        let operators = raw
            .operators
            .into_iter()
            .map(|op| Operator {
                display_name: op.name.unwrap_or_else(|| op.id.clone()),
                id: op.id,
            })
            .collect();

        Self {
            operators,
            admins: raw.admins.into_iter().collect(),
            code_ttl: Duration::from_secs(raw.code_ttl_seconds.unwrap_or(DEFAULT_CODE_TTL_SECS)),
            code_requests_per_hour: raw
                .code_requests_per_hour
                .unwrap_or(DEFAULT_CODE_REQUESTS_PER_HOUR),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Operator> {
        self.operators.iter().find(|op| op.id == id)
    }

    pub fn is_operator(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn is_admin(&self, id: &str) -> bool {
        self.admins.contains(id)
    }

    /// Display name for notifications, falling back to the raw identity
    pub fn display_name(&self, id: &str) -> String {
        self.get(id)
            .map(|op| op.display_name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::from_raw(RawAccessConfig::default())
    }
}

/// Allowed minute values for start and extend requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub start_minutes: Vec<u32>,
    pub extend_minutes: Vec<u32>,
}

impl Schedule {
    fn from_raw(raw: RawScheduleConfig) -> Self {
        Self {
            start_minutes: raw
                .start_minutes
                .unwrap_or_else(|| DEFAULT_START_MINUTES.to_vec()),
            extend_minutes: raw
                .extend_minutes
                .unwrap_or_else(|| DEFAULT_EXTEND_MINUTES.to_vec()),
        }
    }

    pub fn allows_start(&self, minutes: u32) -> bool {
        self.start_minutes.contains(&minutes)
    }

    pub fn allows_extend(&self, minutes: u32) -> bool {
        self.extend_minutes.contains(&minutes)
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::from_raw(RawScheduleConfig::default())
    }
}

/// Polling cadence, timeouts and fixed delays of the orchestration sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub poll_interval: Duration,
    pub resource_boot_timeout: Duration,
    pub resource_stop_timeout: Duration,
    pub daemon_boot_timeout: Duration,
    pub settle_delay: Duration,
    pub daemon_stop_grace: Duration,
    pub pre_resource_stop_delay: Duration,
}

impl Timings {
    pub fn from_raw(raw: &RawTimings) -> Self {
        let d = Self::default();
        let secs = |v: Option<u64>, fallback: Duration| v.map(Duration::from_secs).unwrap_or(fallback);

        Self {
            poll_interval: secs(raw.poll_interval_seconds, d.poll_interval),
            resource_boot_timeout: secs(raw.resource_boot_timeout_seconds, d.resource_boot_timeout),
            resource_stop_timeout: secs(raw.resource_stop_timeout_seconds, d.resource_stop_timeout),
            daemon_boot_timeout: secs(raw.daemon_boot_timeout_seconds, d.daemon_boot_timeout),
            settle_delay: secs(raw.settle_delay_seconds, d.settle_delay),
            daemon_stop_grace: secs(raw.daemon_stop_grace_seconds, d.daemon_stop_grace),
            pre_resource_stop_delay: secs(
                raw.pre_resource_stop_delay_seconds,
                d.pre_resource_stop_delay,
            ),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            resource_boot_timeout: Duration::from_secs(120),
            resource_stop_timeout: Duration::from_secs(90),
            daemon_boot_timeout: Duration::from_secs(80),
            settle_delay: Duration::from_secs(30),
            daemon_stop_grace: Duration::from_secs(120),
            pre_resource_stop_delay: Duration::from_secs(5),
        }
    }
}

/// Aliyun ECS instance
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    pub region_id: String,
    pub instance_id: String,
    pub cli_path: PathBuf,
    pub profile: Option<String>,
}

impl ResourceConfig {
    fn from_raw(raw: RawResourceConfig) -> Self {
        Self {
            region_id: raw.region_id,
            instance_id: raw.instance_id,
            cli_path: raw.cli_path.unwrap_or_else(|| PathBuf::from("aliyun")),
            profile: raw.profile,
        }
    }
}

/// MCSManager daemon
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub base_url: String,
    pub api_key: String,
    pub daemon_id: String,
    pub instance_uuid: String,
    pub request_timeout: Duration,
}

impl DaemonConfig {
    fn from_raw(raw: RawDaemonConfig) -> Self {
        Self {
            base_url: raw.base_url.trim_end_matches('/').to_string(),
            api_key: raw.api_key,
            daemon_id: raw.daemon_id,
            instance_uuid: raw.instance_uuid,
            request_timeout: Duration::from_secs(raw.request_timeout_seconds.unwrap_or(10)),
        }
    }
}

/// Chat notifications
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    pub timeout: Duration,
}

impl NotifyConfig {
    fn from_raw(raw: RawNotifyConfig) -> Self {
        Self {
            webhook_url: raw.webhook_url.filter(|url| !url.trim().is_empty()),
            timeout: Duration::from_secs(raw.timeout_seconds.unwrap_or(5)),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self::from_raw(RawNotifyConfig::default())
    }
}
