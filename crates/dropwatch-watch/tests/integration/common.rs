//! Shared helpers for watch integration tests

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use dropwatch_core::{
    config::WatchConfigBuilder,
    ports::{EventHandler, HandlerSet, NamedHandler},
    HandlerError, NotificationEvent,
};
use dropwatch_watch::{RunningService, WatchService};

/// Upper bound for anything the backend is expected to report
pub const DEADLINE: Duration = Duration::from_secs(10);

/// Time allowed for an event that must NOT produce a dispatch
pub const QUIET_PERIOD: Duration = Duration::from_millis(750);

/// Records every path it is invoked with
#[derive(Default)]
pub struct Recording {
    seen: Mutex<Vec<PathBuf>>,
}

impl Recording {
    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count_of(&self, path: &Path) -> usize {
        self.seen.lock().unwrap().iter().filter(|p| *p == path).count()
    }
}

#[async_trait]
impl EventHandler for Recording {
    async fn handle(&self, _event: &NotificationEvent, path: &Path) -> Result<(), HandlerError> {
        self.seen.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

/// Always fails
pub struct Failing;

#[async_trait]
impl EventHandler for Failing {
    async fn handle(&self, _event: &NotificationEvent, _path: &Path) -> Result<(), HandlerError> {
        Err(HandlerError::fatal("simulated failure"))
    }
}

/// Tracks how many invocations run at the same time
pub struct ConcurrencyProbe {
    hold: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventHandler for ConcurrencyProbe {
    async fn handle(&self, _event: &NotificationEvent, _path: &Path) -> Result<(), HandlerError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Tags a handler with an identifier
pub fn named(id: &str, handler: Arc<dyn EventHandler>) -> NamedHandler {
    NamedHandler::new(id, handler)
}

/// Starts the service on `root` with the given handlers
pub async fn start(
    root: &Path,
    recursive: bool,
    workers: usize,
    handlers: Vec<NamedHandler>,
) -> RunningService {
    let config = WatchConfigBuilder::new(root)
        .recursive(recursive)
        .workers(workers)
        .shutdown_timeout_secs(10)
        .build();
    WatchService::start(&config, HandlerSet::new(handlers))
        .await
        .expect("service starts")
}

/// Polls `condition` until it holds or [`DEADLINE`] passes
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + DEADLINE;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

/// Runs `fut` with [`DEADLINE`] as timeout
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(DEADLINE, fut)
        .await
        .expect("operation finished before deadline")
}
