//! Shared types for the underlampd API

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the managed resource/daemon pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Extending,
    Stopping,
    /// The auto-shutdown trigger claimed the resource and the stop sequence is about to run
    WaitingForStop,
}

impl LifecycleState {
    /// States held while an operation is in flight
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            LifecycleState::Starting
                | LifecycleState::Extending
                | LifecycleState::Stopping
                | LifecycleState::WaitingForStop
        )
    }

    /// States in which an expiry time is defined
    pub fn has_expiry(&self) -> bool {
        matches!(
            self,
            LifecycleState::Running | LifecycleState::Extending | LifecycleState::WaitingForStop
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Extending => "extending",
            LifecycleState::Stopping => "stopping",
            LifecycleState::WaitingForStop => "waiting_for_stop",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: LifecycleState,
    pub start_time: Option<DateTime<Local>>,
    pub expire_time: Option<DateTime<Local>>,
    /// Whole minutes until auto-shutdown, floored and never negative
    pub remaining_minutes: Option<u64>,
}

impl StatusSnapshot {
    pub fn stopped() -> Self {
        Self {
            state: LifecycleState::Stopped,
            start_time: None,
            expire_time: None,
            remaining_minutes: None,
        }
    }
}

/// The user-facing intents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Start,
    Extend,
    Stop,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Start => "start",
            OperationKind::Extend => "extend",
            OperationKind::Stop => "stop",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asked for an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Actor {
    /// A human operator, identified by display name
    Operator { name: String },
    /// The expiry timer
    AutoShutdown,
}

impl Actor {
    pub fn operator(name: impl Into<String>) -> Self {
        Actor::Operator { name: name.into() }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Operator { name } => f.write_str(name),
            Actor::AutoShutdown => f.write_str("auto-shutdown"),
        }
    }
}

/// How an operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The sequence ran to completion
    Completed,
    /// The pre-check refused the operation; nothing external was touched
    Rejected,
    /// The sequence failed and the state rolled back
    Failed,
    /// Part of the sequence took effect and part did not
    PartialFailure,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Completed => "completed",
            OutcomeKind::Rejected => "rejected",
            OutcomeKind::Failed => "failed",
            OutcomeKind::PartialFailure => "partial_failure",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Any local client; lifecycle requests still need an operator code
    Operator,
    /// Same UID as the service (or root); can also issue verification codes
    Admin,
}

impl ClientRole {
    pub fn can_issue_codes(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub state: LifecycleState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_state_wire_names() {
        let json = serde_json::to_string(&LifecycleState::WaitingForStop).unwrap();
        assert_eq!(json, "\"waiting_for_stop\"");
        assert_eq!(LifecycleState::WaitingForStop.to_string(), "waiting_for_stop");
    }

    #[test]
    fn transitional_and_expiry_sets() {
        assert!(!LifecycleState::Stopped.is_transitional());
        assert!(!LifecycleState::Running.is_transitional());
        assert!(LifecycleState::WaitingForStop.is_transitional());

        assert!(LifecycleState::WaitingForStop.has_expiry());
        assert!(!LifecycleState::Stopped.has_expiry());
        assert!(!LifecycleState::Starting.has_expiry());
    }

    #[test]
    fn actor_serialization() {
        let actor = Actor::operator("Steve");
        let json = serde_json::to_string(&actor).unwrap();
        assert!(json.contains("\"type\":\"operator\""));
        assert_eq!(actor.to_string(), "Steve");
        assert_eq!(Actor::AutoShutdown.to_string(), "auto-shutdown");
    }

    #[test]
    fn only_admin_issues_codes() {
        assert!(ClientRole::Admin.can_issue_codes());
        assert!(!ClientRole::Operator.can_issue_codes());
    }
}
