//! Watched directory set
//!
//! [`WatchTree`] owns the notification source's registrations and the
//! token → directory mapping. It keeps every directory reachable from the
//! root at the last scan registered, and grows as new subdirectories appear.
//!
//! Mutation happens only from the event loop (and from startup before the
//! loop runs). The mapping is a `DashMap` so the running-service handle can
//! read it concurrently.

use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use dashmap::DashMap;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{source::NotificationSource, WatchError, WatchToken};

/// Outcome of a recursive registration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    /// Directories now watched (including ones already watched before the call)
    pub registered: usize,
    /// Directories that could not be watched; their subtrees were skipped
    pub failed: usize,
}

/// The set of currently watched directories
pub struct WatchTree<S> {
    source: Mutex<S>,
    dirs: DashMap<WatchToken, PathBuf>,
}

impl<S: NotificationSource> WatchTree<S> {
    /// Creates an empty tree over `source`
    pub fn new(source: S) -> Self {
        Self {
            source: Mutex::new(source),
            dirs: DashMap::new(),
        }
    }

    fn source(&self) -> MutexGuard<'_, S> {
        // A panic while holding the lock leaves the source itself intact.
        self.source.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a single directory
    ///
    /// # Errors
    /// Returns the source's error when `dir` is not a directory or cannot be
    /// watched. Nothing is recorded in that case.
    pub fn register_one(&self, dir: &Path) -> Result<WatchToken, WatchError> {
        let token = self.source().watch(dir)?;
        if self.dirs.insert(token, dir.to_path_buf()).is_none() {
            debug!(path = %dir.display(), %token, "Registered directory");
        }
        Ok(token)
    }

    /// Registers `root` and every directory below it
    ///
    /// A directory that fails to register is logged and its subtree skipped;
    /// siblings are still registered. Symlinks are not followed. Calling this
    /// again on an already-registered subtree creates no new tokens.
    pub fn register_all(&self, root: &Path) -> RegistrationReport {
        let mut report = RegistrationReport::default();
        let mut walker = WalkDir::new(root).follow_links(false).into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(
                        path = ?err.path(),
                        error = %err,
                        "Cannot read directory, skipping its entries"
                    );
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            match self.register_one(entry.path()) {
                Ok(_) => report.registered += 1,
                Err(err) => {
                    warn!(
                        path = %entry.path().display(),
                        error = %err,
                        "Failed to register directory, skipping subtree"
                    );
                    report.failed += 1;
                    walker.skip_current_dir();
                }
            }
        }

        info!(
            root = %root.display(),
            registered = report.registered,
            failed = report.failed,
            "Registration pass complete"
        );
        report
    }

    /// Directory for `token`, or `None` if the token is unknown or retired
    pub fn resolve(&self, token: WatchToken) -> Option<PathBuf> {
        self.dirs.get(&token).map(|entry| entry.value().clone())
    }

    /// Re-arms `token` after its batch; `false` means it must be retired
    pub fn rearm(&self, token: WatchToken) -> bool {
        self.source().rearm(token)
    }

    /// Forgets `token` and releases its registration
    ///
    /// Returns `true` when no watched directory remains.
    pub fn retire(&self, token: WatchToken) -> bool {
        if let Some((_, path)) = self.dirs.remove(&token) {
            info!(path = %path.display(), %token, "Directory no longer watchable, retired");
        }
        self.source().cancel(token);
        self.dirs.is_empty()
    }

    /// Releases every registration; used when the loop exits
    pub fn release(&self) {
        let tokens: Vec<WatchToken> = self.dirs.iter().map(|entry| *entry.key()).collect();
        let mut source = self.source();
        for token in tokens {
            source.cancel(token);
            self.dirs.remove(&token);
        }
    }

    /// Number of watched directories
    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    /// Returns true if nothing is watched
    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Snapshot of the watched directories, sorted
    pub fn directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.dirs.iter().map(|entry| entry.value().clone()).collect();
        dirs.sort();
        dirs
    }
}
