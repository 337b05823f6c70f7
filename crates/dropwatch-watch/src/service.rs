//! Service facade
//!
//! [`WatchService::start`] performs the startup sequence (open the facility,
//! register the root, build the pool) and runs the [`EventLoop`] on a
//! dedicated blocking thread, since directory walks during registration are
//! synchronous filesystem work. The returned [`RunningService`] is the handle
//! used to observe and stop it.

use std::{path::PathBuf, sync::Arc};

use dropwatch_core::{config::WatchConfig, ports::HandlerSet, ConfigError};
use tokio::{
    runtime::Handle,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    event_loop::{EventLoop, LoopExit, LoopState},
    pool::WorkerPool,
    source::{NotificationBatch, NotificationSource, NotifySource},
    tree::WatchTree,
    WatchError,
};

/// Identity of this watcher process: `<pid>@<hostname>`
pub fn process_identity() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    format!("{}@{}", std::process::id(), host)
}

/// Entry point for starting a watcher
pub struct WatchService;

impl WatchService {
    /// Starts watching with the platform's native notification backend
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - [`WatchError::Backend`] if the backend cannot be created
    /// - [`WatchError::Config`] with [`ConfigError::RootNotWatchable`] if the
    ///   root cannot be registered
    pub async fn start(
        config: &WatchConfig,
        handlers: HandlerSet,
    ) -> Result<RunningService<NotifySource>, WatchError> {
        let (source, rx) = NotifySource::new()?;
        Self::start_with(config, handlers, source, rx).await
    }

    /// Starts watching with an explicit notification source
    pub async fn start_with<S: NotificationSource>(
        config: &WatchConfig,
        handlers: HandlerSet,
        source: S,
        rx: mpsc::UnboundedReceiver<NotificationBatch>,
    ) -> Result<RunningService<S>, WatchError> {
        let identity = process_identity();
        let root = std::fs::canonicalize(&config.dir_to_watch).map_err(|err| {
            ConfigError::RootNotWatchable {
                path: config.dir_to_watch.clone(),
                reason: err.to_string(),
            }
        })?;

        let tree = Arc::new(WatchTree::new(source));
        tree.register_one(&root)
            .map_err(|err| ConfigError::RootNotWatchable {
                path: root.clone(),
                reason: err.to_string(),
            })?;
        if config.recursive {
            let walk_root = root.clone();
            let walk_tree = Arc::clone(&tree);
            tokio::task::spawn_blocking(move || walk_tree.register_all(&walk_root))
                .await
                .map_err(|err| ConfigError::RootNotWatchable {
                    path: root.clone(),
                    reason: err.to_string(),
                })?;
        }

        let pool = WorkerPool::new(config.max_event_handler_workers_number);
        let event_loop = EventLoop::new(Arc::clone(&tree), rx, pool, handlers.clone())
            .recursive(config.recursive)
            .shutdown_timeout(config.shutdown_timeout());
        let cancel = event_loop.cancellation_token();
        let state = event_loop.state();

        let runtime = Handle::current();
        let join = tokio::task::spawn_blocking(move || runtime.block_on(event_loop.run()));

        info!(
            identity = %identity,
            root = %root.display(),
            directories = tree.len(),
            recursive = config.recursive,
            workers = config.max_event_handler_workers_number,
            handlers = ?handlers.ids(),
            "Watch service started"
        );

        Ok(RunningService {
            identity,
            root,
            tree,
            cancel,
            state,
            join,
        })
    }
}

/// Handle to a started watcher
pub struct RunningService<S = NotifySource> {
    identity: String,
    root: PathBuf,
    tree: Arc<WatchTree<S>>,
    cancel: CancellationToken,
    state: watch::Receiver<LoopState>,
    join: JoinHandle<LoopExit>,
}

impl<S: NotificationSource> RunningService<S> {
    /// Process identity the service was started under
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Canonical watched root
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Current loop state
    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Receiver for state changes
    pub fn state_changes(&self) -> watch::Receiver<LoopState> {
        self.state.clone()
    }

    /// Currently watched directories, sorted
    pub fn watched_directories(&self) -> Vec<PathBuf> {
        self.tree.directories()
    }

    /// Token that stops the service when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests a stop; [`wait`](Self::wait) observes completion
    pub fn stop(&self) {
        info!(identity = %self.identity, "Stop requested");
        self.cancel.cancel();
    }

    /// Waits for the loop to finish
    ///
    /// # Errors
    /// Returns [`WatchError::Join`] if the loop thread panicked.
    pub async fn wait(self) -> Result<LoopExit, WatchError> {
        match self.join.await {
            Ok(exit) => Ok(exit),
            Err(err) => {
                error!(identity = %self.identity, error = %err, "Event loop terminated abnormally");
                Err(WatchError::Join(err))
            }
        }
    }

    /// Stops the service and waits for it
    pub async fn shutdown(self) -> Result<LoopExit, WatchError> {
        self.stop();
        self.wait().await
    }
}
