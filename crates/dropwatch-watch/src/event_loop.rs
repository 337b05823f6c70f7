//! The event loop
//!
//! The loop is the only driver of the pipeline. It waits for the next
//! notification batch (the single suspension point, interruptible through a
//! [`CancellationToken`]), interprets each event, grows the [`WatchTree`] when
//! directories appear and submits file creations to the [`WorkerPool`].
//!
//! ## State machine
//!
//! ```text
//!  Running ──cancel──→ Stopping ──pool drained──→ Stopped
//!     │
//!     └──tree empty / source closed──────────────→ Stopped
//! ```
//!
//! Known gaps, kept observable rather than hidden:
//! - a file created in a new directory before that directory is registered
//!   is not reported
//! - an overflow is logged and counted but does not trigger a rescan

use std::{path::Path, sync::Arc, time::Duration};

use dropwatch_core::{ports::HandlerSet, EventKind, NotificationEvent};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    dispatch::dispatch_unit,
    pool::WorkerPool,
    source::{NotificationBatch, NotificationSource},
    tree::WatchTree,
    WatchToken,
};

/// Default bound on waiting for in-flight handlers at shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle state of an [`EventLoop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Processing notifications
    Running,
    /// Cancellation observed, draining handler work
    Stopping,
    /// Finished; the facility has been released
    Stopped,
}

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// An external stop request was observed
    Cancelled,
    /// Every watched directory became invalid
    TreeExhausted,
    /// The notification source closed its channel
    SourceClosed,
}

/// Drives notifications from a source into the tree and the worker pool
pub struct EventLoop<S> {
    tree: Arc<WatchTree<S>>,
    rx: mpsc::UnboundedReceiver<NotificationBatch>,
    pool: WorkerPool,
    handlers: HandlerSet,
    recursive: bool,
    shutdown_timeout: Duration,
    cancel: CancellationToken,
    state: watch::Sender<LoopState>,
    overflows: u64,
    dispatched: u64,
}

impl<S: NotificationSource> EventLoop<S> {
    /// Creates a loop over an already-populated tree
    ///
    /// # Arguments
    /// * `tree` - Watched directories; the loop becomes their only writer
    /// * `rx` - Batches produced by the tree's notification source
    /// * `pool` - Pool the dispatch units are submitted to
    /// * `handlers` - Handlers invoked for every created file
    pub fn new(
        tree: Arc<WatchTree<S>>,
        rx: mpsc::UnboundedReceiver<NotificationBatch>,
        pool: WorkerPool,
        handlers: HandlerSet,
    ) -> Self {
        let (state, _) = watch::channel(LoopState::Running);
        Self {
            tree,
            rx,
            pool,
            handlers,
            recursive: true,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            cancel: CancellationToken::new(),
            state,
            overflows: 0,
            dispatched: 0,
        }
    }

    /// Whether new subdirectories are registered
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Bound on waiting for handler work when the loop ends
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Token that stops the loop when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receiver observing the loop state
    pub fn state(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Runs until cancelled, until the tree is empty or the source closes
    ///
    /// On the way out the pool stops accepting work and is drained (bounded by
    /// the shutdown timeout), then every registration is released.
    pub async fn run(mut self) -> LoopExit {
        info!(
            directories = self.tree.len(),
            recursive = self.recursive,
            handlers = ?self.handlers.ids(),
            "Event loop started"
        );

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break LoopExit::Cancelled,
                batch = self.rx.recv() => batch,
            };
            let Some(batch) = next else {
                break LoopExit::SourceClosed;
            };
            if self.process_batch(batch) {
                break LoopExit::TreeExhausted;
            }
        };

        match exit {
            LoopExit::Cancelled => {
                self.state.send_replace(LoopState::Stopping);
                info!("Stop requested, draining handler work");
            }
            LoopExit::TreeExhausted => {
                info!("No watched directories left, stopping");
            }
            LoopExit::SourceClosed => {
                warn!("Notification source closed, stopping");
            }
        }

        self.pool.shutdown(self.shutdown_timeout).await;
        self.tree.release();
        self.state.send_replace(LoopState::Stopped);

        info!(
            ?exit,
            dispatched = self.dispatched,
            overflows = self.overflows,
            "Event loop stopped"
        );
        exit
    }

    /// Handles one batch; returns `true` when the tree became empty
    fn process_batch(&mut self, batch: NotificationBatch) -> bool {
        let Some(token) = batch.token else {
            for event in &batch.events {
                self.process_unattributed(event);
            }
            return false;
        };

        let Some(dir) = self.tree.resolve(token) else {
            debug!(%token, events = batch.events.len(), "Batch for unknown token, skipping");
            return false;
        };

        for event in &batch.events {
            match event.kind {
                EventKind::Created => self.on_created(&dir, event),
                EventKind::Overflow => self.on_overflow(),
                EventKind::Other => {
                    trace!(%token, name = %event.name.display(), "Ignoring event");
                }
            }
        }

        self.rearm_or_retire(token)
    }

    fn process_unattributed(&mut self, event: &NotificationEvent) {
        match event.kind {
            EventKind::Overflow => self.on_overflow(),
            _ => debug!(%event, "Ignoring event without a directory"),
        }
    }

    fn rearm_or_retire(&self, token: WatchToken) -> bool {
        if self.tree.rearm(token) {
            return false;
        }
        self.tree.retire(token)
    }

    fn on_overflow(&mut self) {
        self.overflows += 1;
        warn!(
            overflows = self.overflows,
            "Notifications were dropped; files created meanwhile may be missed"
        );
    }

    fn on_created(&mut self, dir: &Path, event: &NotificationEvent) {
        let path = dir.join(&event.name);

        match entry_kind(&path) {
            Entry::Directory if self.recursive => {
                debug!(path = %path.display(), "Directory created, registering subtree");
                self.tree.register_all(&path);
                return;
            }
            Entry::Directory => {
                debug!(path = %path.display(), "Directory created, not recursive");
                return;
            }
            Entry::Unsupported => {
                debug!(path = %path.display(), "Not a regular file, ignoring");
                return;
            }
            Entry::File => {}
        }

        let unit = dispatch_unit(self.handlers.clone(), event.clone(), path.clone());
        match self.pool.submit(unit) {
            Ok(()) => {
                self.dispatched += 1;
                debug!(path = %path.display(), "File submitted for dispatch");
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Could not submit file for dispatch");
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Entry {
    File,
    Directory,
    Unsupported,
}

/// Classifies a created entry without following directory symlinks
///
/// A symlink counts as a file only when it resolves to a regular file. An
/// entry that is gone already counts as a file; handlers own that race.
fn entry_kind(path: &Path) -> Entry {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Entry::File,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Cannot inspect created entry");
            return Entry::Unsupported;
        }
    };

    if meta.is_dir() {
        Entry::Directory
    } else if meta.is_file() {
        Entry::File
    } else if meta.file_type().is_symlink()
        && std::fs::metadata(path).is_ok_and(|target| target.is_file())
    {
        Entry::File
    } else {
        Entry::Unsupported
    }
}
