//! Concrete collaborators for underlampd
//!
//! Provides:
//! - Aliyun ECS control through the `aliyun` CLI
//! - MCSManager daemon control over HTTP
//! - Chat webhook and log-only notifiers

mod aliyun;
mod mcs;
mod notify;

pub use aliyun::*;
pub use mcs::*;
pub use notify::*;
