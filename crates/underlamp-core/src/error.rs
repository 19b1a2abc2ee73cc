//! Orchestration errors

use std::time::Duration;
use thiserror::Error;
use underlamp_host_api::HostError;
use underlamp_util::format_duration;

/// Errors raised inside an orchestration sequence
///
/// These never escape the orchestrator: every sequence converts them into an
/// [`Outcome`](crate::Outcome) after reporting back to the lifecycle.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// A polled collaborator never reached the wanted status
    #[error("{what} timed out after {} (last status: {last_status})", format_duration(*.after))]
    Timeout {
        what: &'static str,
        after: Duration,
        last_status: String,
    },

    /// A collaborator call failed
    #[error(transparent)]
    External(#[from] HostError),

    /// A collaborator reported a status the sequence cannot continue from
    #[error("{what} is {status}")]
    UnexpectedStatus { what: &'static str, status: String },

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;
