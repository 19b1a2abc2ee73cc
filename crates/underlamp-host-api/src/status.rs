//! Status values reported by the collaborators

use serde::{Deserialize, Serialize};
use std::fmt;

/// Power state of the cloud resource as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Pending,
    Unknown,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Starting => "Starting",
            ResourceStatus::Running => "Running",
            ResourceStatus::Stopping => "Stopping",
            ResourceStatus::Stopped => "Stopped",
            ResourceStatus::Pending => "Pending",
            ResourceStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the resource should be stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStopMode {
    /// Release compute billing while stopped
    CostSaving,
    /// Keep the compute reserved (and billed) while stopped
    KeepBilling,
}

/// State of the game-server process as reported by the daemon manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DaemonStatus {
    Busy,
    Stopped,
    Stopping,
    Starting,
    Running,
    Unknown,
}

impl DaemonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonStatus::Busy => "Busy",
            DaemonStatus::Stopped => "Stopped",
            DaemonStatus::Stopping => "Stopping",
            DaemonStatus::Starting => "Starting",
            DaemonStatus::Running => "Running",
            DaemonStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
