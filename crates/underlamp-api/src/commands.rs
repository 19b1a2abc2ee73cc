//! Command types for the underlampd protocol

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use underlamp_util::{ClientId, OperationId};

use crate::{ClientRole, HealthStatus, StatusSnapshot, API_VERSION};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    /// Requested minutes are not in the allowed set
    InvalidDuration,
    /// Unknown operator, wrong code or expired code
    VerificationFailed,
    /// Operator is known but not allowed to perform this action
    NotAuthorized,
    /// Client role is insufficient
    PermissionDenied,
    RateLimited,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Boot the resource and daemon for `minutes`
    Start {
        operator: String,
        code: String,
        minutes: u32,
    },

    /// Push the auto-shutdown back by `minutes`
    Extend {
        operator: String,
        code: String,
        minutes: u32,
    },

    /// Stop the daemon and the resource
    Stop { operator: String, code: String },

    /// Current lifecycle snapshot
    GetStatus { operator: String, code: String },

    /// Mint a verification code for an operator (admin only)
    IssueCode { operator: String },

    /// Grant an operator access until the service restarts
    AddOperator {
        operator: String,
        code: String,
        target: String,
        display_name: String,
    },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    /// Unsubscribe from events
    UnsubscribeEvents,

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

impl Command {
    /// Operator named by the command, if any
    pub fn operator(&self) -> Option<&str> {
        match self {
            Command::Start { operator, .. }
            | Command::Extend { operator, .. }
            | Command::Stop { operator, .. }
            | Command::GetStatus { operator, .. }
            | Command::IssueCode { operator }
            | Command::AddOperator { operator, .. } => Some(operator),
            _ => None,
        }
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    /// The operation was admitted and runs in the background
    Accepted {
        operation_id: OperationId,
        message: String,
    },
    Status(StatusSnapshot),
    CodeIssued {
        operator: String,
        code: String,
        expires_at: DateTime<Local>,
    },
    OperatorAdded {
        target: String,
        /// False when the target was already on the access list
        added: bool,
    },
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}
