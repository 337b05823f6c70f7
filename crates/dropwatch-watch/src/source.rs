//! Notification facility seam and its `notify` adapter
//!
//! The event loop does not talk to `notify` directly. It consumes
//! [`NotificationBatch`] values from a channel and manages registrations
//! through the [`NotificationSource`] trait, which lets tests drive the loop
//! with a scripted source.
//!
//! [`NotifySource`] watches every directory individually with
//! [`RecursiveMode::NonRecursive`]; recursion is the job of
//! [`WatchTree`](crate::tree::WatchTree). The backend callback runs on the
//! backend's own thread and only pushes onto an unbounded channel, so it never
//! blocks.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use dropwatch_core::{EventKind, NotificationEvent};
use notify::event::{ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::{WatchError, WatchToken};

// ============================================================================
// NotificationBatch
// ============================================================================

/// Events reported together for one watched directory
///
/// `token` is `None` only for overflow batches, which the facility cannot
/// attribute to a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationBatch {
    /// Directory the events belong to
    pub token: Option<WatchToken>,
    /// Events in arrival order
    pub events: Vec<NotificationEvent>,
}

impl NotificationBatch {
    /// Creates a batch for a watched directory
    pub fn new(token: WatchToken, events: Vec<NotificationEvent>) -> Self {
        Self {
            token: Some(token),
            events,
        }
    }

    /// Creates an overflow marker batch
    pub fn overflow() -> Self {
        Self {
            token: None,
            events: vec![NotificationEvent::overflow()],
        }
    }
}

// ============================================================================
// NotificationSource trait
// ============================================================================

/// Registration side of a notification facility
///
/// Batches themselves arrive on a channel handed out when the source is
/// created; this trait only manages what is watched.
pub trait NotificationSource: Send + 'static {
    /// Starts watching `dir` for entries being created
    ///
    /// Watching an already-watched directory returns its existing token.
    ///
    /// # Errors
    /// [`WatchError::NotADirectory`] if `dir` is not a directory,
    /// [`WatchError::Registration`] if the facility refuses it.
    fn watch(&mut self, dir: &Path) -> Result<WatchToken, WatchError>;

    /// Re-arms a token after its batch was processed
    ///
    /// Returns `false` when the token is permanently invalid and must be retired.
    fn rearm(&mut self, token: WatchToken) -> bool;

    /// Releases the facility resources held for `token`
    fn cancel(&mut self, token: WatchToken);
}

// ============================================================================
// NotifySource
// ============================================================================

/// [`NotificationSource`] backed by the platform's native `notify` watcher
pub struct NotifySource {
    watcher: RecommendedWatcher,
    /// Shared with the backend callback to attribute events to tokens
    index: Arc<DashMap<PathBuf, WatchToken>>,
    watched: HashMap<WatchToken, PathBuf>,
    next_token: u64,
}

impl NotifySource {
    /// Creates the backend watcher
    ///
    /// Returns the source and the receiver on which notification batches arrive.
    ///
    /// # Errors
    /// Returns [`WatchError::Backend`] if the OS watcher cannot be created
    /// (e.g. the inotify instance limit is reached).
    pub fn new() -> Result<(Self, mpsc::UnboundedReceiver<NotificationBatch>), WatchError> {
        let (tx, rx) = mpsc::unbounded_channel::<NotificationBatch>();
        let index: Arc<DashMap<PathBuf, WatchToken>> = Arc::new(DashMap::new());
        let callback_index = Arc::clone(&index);

        info!("Initializing notification source");

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for batch in map_notify_event(&event, &callback_index) {
                        if tx.send(batch).is_err() {
                            debug!("Notification receiver dropped, discarding batch");
                            return;
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, paths = ?err.paths, "Notification backend error");
                }
            },
            notify::Config::default(),
        )?;

        Ok((
            Self {
                watcher,
                index,
                watched: HashMap::new(),
                next_token: 1,
            },
            rx,
        ))
    }
}

impl NotificationSource for NotifySource {
    fn watch(&mut self, dir: &Path) -> Result<WatchToken, WatchError> {
        if !dir.is_dir() {
            return Err(WatchError::NotADirectory(dir.to_path_buf()));
        }
        if let Some(existing) = self.index.get(dir) {
            return Ok(*existing);
        }

        let token = WatchToken::new(self.next_token);
        self.next_token += 1;

        // Index first so events racing the registration can be attributed.
        self.index.insert(dir.to_path_buf(), token);
        if let Err(source) = self.watcher.watch(dir, RecursiveMode::NonRecursive) {
            self.index.remove(dir);
            return Err(WatchError::Registration {
                path: dir.to_path_buf(),
                source,
            });
        }
        self.watched.insert(token, dir.to_path_buf());

        debug!(path = %dir.display(), %token, "Watching directory");
        Ok(token)
    }

    fn rearm(&mut self, token: WatchToken) -> bool {
        self.watched.get(&token).is_some_and(|path| path.is_dir())
    }

    fn cancel(&mut self, token: WatchToken) {
        let Some(path) = self.watched.remove(&token) else {
            return;
        };
        self.index.remove(&path);
        // The backend usually drops the watch on its own once the directory is gone.
        if let Err(err) = self.watcher.unwatch(&path) {
            debug!(path = %path.display(), %token, error = %err, "Unwatch failed");
        }
    }
}

// ============================================================================
// Event mapping - notify::Event → NotificationBatch
// ============================================================================

/// Converts a raw `notify` event into batches grouped by watched directory
///
/// - rescan flag → a single overflow batch
/// - `Create(*)` and `Modify(Name(To))` → [`EventKind::Created`]
/// - anything else → [`EventKind::Other`]
///
/// A non-creation event whose path is itself a watched directory is attributed
/// to that directory, so its deletion invalidates its own token. Paths outside
/// any watched directory are dropped.
fn map_notify_event(
    event: &notify::Event,
    index: &DashMap<PathBuf, WatchToken>,
) -> Vec<NotificationBatch> {
    if event.need_rescan() {
        debug!(kind = ?event.kind, "Backend requested rescan");
        return vec![NotificationBatch::overflow()];
    }

    let mut batches: Vec<NotificationBatch> = Vec::new();

    for path in &event.paths {
        let kind = classify(&event.kind);

        let own = match kind {
            EventKind::Created => None,
            _ => index.get(path).map(|t| *t),
        };
        let Some(token) = own.or_else(|| path.parent().and_then(|p| index.get(p).map(|t| *t)))
        else {
            debug!(path = %path.display(), "Event outside watched directories, ignoring");
            continue;
        };
        let Some(mapped) = NotificationEvent::from_path(kind, path) else {
            continue;
        };

        match batches.last_mut() {
            Some(batch) if batch.token == Some(token) => batch.events.push(mapped),
            _ => batches.push(NotificationBatch::new(token, vec![mapped])),
        }
    }

    batches
}

// A rename between watched paths arrives as `Name(To)` followed by
// `Name(Both)`; only the former counts as the creation.
fn classify(kind: &notify::EventKind) -> EventKind {
    match kind {
        notify::EventKind::Create(_) => EventKind::Created,
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)) => EventKind::Created,
        _ => EventKind::Other,
    }
}
