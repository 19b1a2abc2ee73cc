//! underlampd service internals
//!
//! The binary wires real collaborators into [`Service`]; tests wire mocks.

mod service;

pub use service::*;
