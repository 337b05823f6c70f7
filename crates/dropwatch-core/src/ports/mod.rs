//! Port definitions
//!
//! Traits at the boundary between the watch engine and the components it
//! drives. Implementations live in adapter crates.
//!
//! - [`EventHandler`] - consumer of file-creation notifications

pub mod handler;

pub use handler::{EventHandler, HandlerSet, NamedHandler};
