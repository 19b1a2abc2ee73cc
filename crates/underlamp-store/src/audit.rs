//! Audit event types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use underlamp_api::{Actor, OperationKind, OutcomeKind};
use underlamp_util::OperationId;

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted { instance_name: String },

    /// Service stopped
    ServiceStopped,

    /// A lifecycle request passed admission and was dispatched
    OperationRequested {
        operation_id: OperationId,
        kind: OperationKind,
        actor: Actor,
        minutes: Option<u32>,
    },

    /// A lifecycle operation reached its outcome
    OperationFinished {
        operation_id: OperationId,
        kind: OperationKind,
        actor: Actor,
        outcome: OutcomeKind,
        message: String,
    },

    /// The expiry timer fired and the stop sequence was dispatched
    AutoShutdownTriggered,

    /// The expiry timer fired but the shutdown did not go ahead
    AutoShutdownAborted { reason: String },

    /// A request was refused at admission
    RequestDenied {
        operator: Option<String>,
        command: String,
        reason: String,
    },

    /// A verification code was issued
    CodeIssued { operator: String },

    /// An operator was granted access at runtime
    OperatorAdded { by: String, target: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: underlamp_util::now(),
            event,
        }
    }
}
