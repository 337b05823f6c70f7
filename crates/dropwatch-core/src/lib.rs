//! Dropwatch Core - domain types and contracts
//!
//! This crate holds everything the watch engine and its handlers agree on:
//! - **Configuration** - named key/value profiles loaded lazily by a [`config::ConfigStore`]
//! - **Events** - the [`event::NotificationEvent`] handed from the watcher to handlers
//! - **Ports** - the [`ports::EventHandler`] capability and the immutable [`ports::HandlerSet`]
//! - **Retry** - the bounded exponential backoff every remote handler honours
//! - **Errors** - the startup and per-file error taxonomy

pub mod config;
pub mod errors;
pub mod event;
pub mod ports;
pub mod retry;

pub use errors::{ConfigError, HandlerError};
pub use event::{EventKind, NotificationEvent};
