//! Protocol types for underlampd IPC
//!
//! This crate defines the stable API between underlampd and clients:
//! - Commands (requests from clients)
//! - Responses
//! - Events (service -> clients)
//! - Lifecycle state and status snapshots
//! - Versioning

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
