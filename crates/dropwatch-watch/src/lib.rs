//! Dropwatch Watch - directory-watch engine and dispatch pipeline
//!
//! This crate turns filesystem notifications into handler invocations:
//!
//! ```text
//!  notify (inotify / kqueue / ...)
//!       │
//!       ▼
//!  NotifySource ──→ mpsc ──→ EventLoop ──┬──→ WatchTree::register_all   (new directory)
//!                                        └──→ WorkerPool::submit        (new file)
//!                                                   │
//!                                                   ▼
//!                                          dispatch → every handler in the HandlerSet
//! ```
//!
//! - [`source`] - the notification facility seam and its `notify` adapter
//! - [`tree`] - the set of watched directories and their tokens
//! - [`pool`] - bounded-concurrency execution of dispatch units
//! - [`dispatch`] - per-file fan-out to handlers with failure isolation
//! - [`event_loop`] - the single driver of the pipeline
//! - [`service`] - startup sequence and the running-service handle

use std::{fmt, path::PathBuf};

use dropwatch_core::ConfigError;
use thiserror::Error;

pub mod dispatch;
pub mod event_loop;
pub mod pool;
pub mod service;
pub mod source;
pub mod tree;


pub use event_loop::{EventLoop, LoopExit, LoopState};
pub use pool::WorkerPool;
pub use service::{RunningService, WatchService};
pub use source::{NotificationBatch, NotificationSource, NotifySource};
pub use tree::{RegistrationReport, WatchTree};

/// Opaque handle issued by a [`NotificationSource`] for one watched directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchToken(u64);

impl WatchToken {
    /// Wraps a raw token value
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw token value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors raised by the watch engine
#[derive(Debug, Error)]
pub enum WatchError {
    /// The path to register is not a directory (or no longer exists)
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// The facility refused to watch a directory
    #[error("Failed to register {}: {source}", .path.display())]
    Registration {
        /// Directory that could not be watched
        path: PathBuf,
        /// Facility error
        #[source]
        source: notify::Error,
    },

    /// The notification backend could not be created
    #[error("Notification backend error: {0}")]
    Backend(#[from] notify::Error),

    /// Work was submitted after the pool began shutting down
    #[error("Worker pool is closed")]
    PoolClosed,

    /// Startup configuration problem
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The event loop thread panicked or was aborted
    #[error("Event loop task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
