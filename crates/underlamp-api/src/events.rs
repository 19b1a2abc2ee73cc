//! Event types for underlampd -> client streaming

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use underlamp_util::OperationId;

use crate::{Actor, OperationKind, OutcomeKind, StatusSnapshot, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: underlamp_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Snapshot after every operation
    StateChanged(StatusSnapshot),

    /// An operation was admitted and is running
    OperationStarted {
        operation_id: OperationId,
        kind: OperationKind,
        actor: Actor,
    },

    /// An operation has reached its final outcome
    OperationFinished {
        operation_id: OperationId,
        kind: OperationKind,
        actor: Actor,
        outcome: OutcomeKind,
        message: String,
    },

    /// The expiry timer fired but the shutdown did not go ahead
    AutoShutdownAborted { reason: String },

    /// Service is shutting down
    Shutdown,
}
