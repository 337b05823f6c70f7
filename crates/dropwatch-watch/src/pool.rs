//! Bounded-concurrency worker pool
//!
//! A fixed number of worker tasks pull dispatch units from a shared unbounded
//! queue. [`WorkerPool::submit`] never waits, so the event loop is never held
//! up by slow handlers; the price is that a sustained flood of files grows the
//! queue without limit.
//!
//! Shutdown closes the queue, lets the workers drain what was already
//! submitted, and waits for them up to a deadline. In-flight work is never
//! aborted.

use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::{future::BoxFuture, FutureExt};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::WatchError;

/// A unit of work executed by one worker
pub type Unit = BoxFuture<'static, ()>;

/// Fixed-size pool of workers executing [`Unit`]s
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::UnboundedSender<Unit>>>,
    tracker: TaskTracker,
    capacity: usize,
}

impl WorkerPool {
    /// Spawns `capacity` workers on the current tokio runtime
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<Unit>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let tracker = TaskTracker::new();

        for worker in 0..capacity {
            let rx = Arc::clone(&rx);
            tracker.spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(unit) = next else {
                        break;
                    };
                    if let Err(panic) = AssertUnwindSafe(unit).catch_unwind().await {
                        error!(worker, panic = %panic_message(&*panic), "Dispatch unit panicked");
                    }
                }
                debug!(worker, "Worker finished");
            });
        }
        tracker.close();

        info!(capacity, "Worker pool started");
        Self {
            sender: Mutex::new(Some(tx)),
            tracker,
            capacity,
        }
    }

    /// Number of workers
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true once shutdown has begun
    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    /// Queues `unit` and returns immediately
    ///
    /// # Errors
    /// [`WatchError::PoolClosed`] once shutdown has begun.
    pub fn submit<F>(&self, unit: F) -> Result<(), WatchError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sender = guard.as_ref().ok_or(WatchError::PoolClosed)?;
        sender
            .send(Box::pin(unit))
            .map_err(|_| WatchError::PoolClosed)
    }

    /// Stops accepting work and waits for queued and in-flight units
    ///
    /// Returns `false` if workers were still busy when `timeout` elapsed; they
    /// keep running detached in that case.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(sender);

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("Worker pool drained");
                true
            }
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    busy_workers = self.tracker.len(),
                    "Worker pool did not drain before timeout"
                );
                false
            }
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
