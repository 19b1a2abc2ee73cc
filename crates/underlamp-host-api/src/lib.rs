//! Collaborator interfaces for underlampd
//!
//! This crate defines the narrow interface between the lifecycle core and the
//! external systems it drives: the cloud resource, the game-server daemon and
//! the notification sink. It contains no provider code itself; concrete
//! clients live in `underlamp-host-cloud`, scriptable mocks live here.

mod mock;
mod status;
mod traits;

pub use mock::*;
pub use status::*;
pub use traits::*;
