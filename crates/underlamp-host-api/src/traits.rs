//! Collaborator traits

use async_trait::async_trait;
use thiserror::Error;

use crate::{DaemonStatus, ResourceStatus, ResourceStopMode};

/// Errors from collaborator calls
#[derive(Debug, Error)]
pub enum HostError {
    /// The cloud provider rejected or failed the call
    #[error("Provider error: {0}")]
    Provider(String),

    /// The daemon manager rejected or failed the call
    #[error("Daemon manager error: {0}")]
    Daemon(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected response: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Controls the remote compute resource (a cloud VM)
///
/// `start` and `stop` only submit the request; callers poll
/// [`describe_status`](ResourceController::describe_status) to learn when the
/// transition completes.
#[async_trait]
pub trait ResourceController: Send + Sync {
    async fn start(&self) -> HostResult<()>;

    async fn stop(&self, force: bool, mode: ResourceStopMode) -> HostResult<()>;

    async fn describe_status(&self) -> HostResult<ResourceStatus>;

    /// Public address of the resource, if one is assigned
    async fn public_address(&self) -> HostResult<Option<String>>;
}

/// Controls the game-server process running on the resource
#[async_trait]
pub trait DaemonController: Send + Sync {
    async fn start(&self) -> HostResult<()>;

    /// Graceful stop
    async fn stop(&self) -> HostResult<()>;

    /// Forced termination
    async fn kill(&self) -> HostResult<()>;

    async fn describe_status(&self) -> HostResult<DaemonStatus>;
}

/// Best-effort outbound notification channel
///
/// Implementations log their own failures; the return value only says whether
/// the message was delivered.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, message: &str) -> bool;
}
