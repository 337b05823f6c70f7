//! Notification events delivered by the watch facility
//!
//! A [`NotificationEvent`] is a transient value: it is produced by the
//! notification source, consumed once by the event loop and, when it denotes
//! a file creation, handed to every configured handler.

use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of filesystem notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An entry appeared in the watched directory (created or moved in)
    Created,
    /// The facility dropped notifications; coverage may have a gap
    Overflow,
    /// Any other change (modification, removal, metadata)
    Other,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Created => "CREATED",
            EventKind::Overflow => "OVERFLOW",
            EventKind::Other => "OTHER",
        };
        write!(f, "{}", s)
    }
}

/// A single notification about an entry of a watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    /// What happened
    pub kind: EventKind,
    /// Directory the entry lives in (empty for [`EventKind::Overflow`])
    pub directory: PathBuf,
    /// Entry name relative to `directory`
    pub name: PathBuf,
}

impl NotificationEvent {
    /// Creates an event for `name` inside `directory`
    pub fn new(kind: EventKind, directory: impl Into<PathBuf>, name: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            directory: directory.into(),
            name: name.into(),
        }
    }

    /// Creates a creation event
    pub fn created(directory: impl Into<PathBuf>, name: impl Into<PathBuf>) -> Self {
        Self::new(EventKind::Created, directory, name)
    }

    /// Creates an overflow marker, which carries no entry
    pub fn overflow() -> Self {
        Self::new(EventKind::Overflow, PathBuf::new(), PathBuf::new())
    }

    /// Builds an event from an absolute path, splitting it into directory and name
    ///
    /// Returns `None` for paths without a parent or file name (e.g. `/`).
    pub fn from_path(kind: EventKind, path: &Path) -> Option<Self> {
        let directory = path.parent()?;
        let name = path.file_name()?;
        Some(Self::new(kind, directory, name))
    }

    /// Absolute path of the entry
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::Overflow => write!(f, "{}", self.kind),
            _ => write!(f, "{}: {}", self.kind, self.path().display()),
        }
    }
}
