//! Lifecycle core for underlampd
//!
//! This crate contains:
//! - The lifecycle state machine (Stopped -> Starting -> Running -> Stopping -> Stopped)
//! - The expiry timer and auto-shutdown re-validation
//! - Orchestration sequences driving the resource and daemon collaborators
//! - The verification code book used at request admission

mod clock;
mod error;
mod lifecycle;
pub mod notice;
mod orchestrator;
mod poll;
mod timer;
mod verification;

pub use clock::*;
pub use error::*;
pub use lifecycle::*;
pub use orchestrator::*;
pub use poll::*;
pub use timer::*;
pub use verification::*;
