//! Shared utilities for underlampd
//!
//! This crate provides:
//! - ID types (ClientId, OperationId)
//! - Time utilities (mockable wall clock, display helpers, remaining minutes)
//! - Rate limiting helpers
//! - Default paths for socket, config and data directories

mod ids;
mod paths;
mod rate_limit;
mod time;

pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
