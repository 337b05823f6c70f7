//! Event handler port
//!
//! Defines the capability every file handler implements and the immutable
//! set of handlers shared by all dispatch calls.
//!
//! ## Design Notes
//!
//! - Uses `#[async_trait]` so handlers can perform remote I/O.
//! - A handler is invoked at most once per observed file-creation event.
//!   Errors are caught and logged by the dispatcher, but a handler that talks
//!   to a remote service is expected to run its own
//!   [`RetryPolicy`](crate::retry::RetryPolicy) first.
//! - Handlers are shared read-only across concurrent invocations; any mutable
//!   state must be internally synchronised.

use std::{fmt, path::Path, sync::Arc};

use async_trait::async_trait;

use crate::{errors::HandlerError, event::NotificationEvent};

/// A consumer of file-creation notifications
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one newly created file
    ///
    /// # Arguments
    /// * `event` - The notification as observed by the watcher
    /// * `path` - Absolute path of the created file
    async fn handle(&self, event: &NotificationEvent, path: &Path) -> Result<(), HandlerError>;
}

/// A handler tagged with the identifier it was configured under
#[derive(Clone)]
pub struct NamedHandler {
    id: String,
    handler: Arc<dyn EventHandler>,
}

impl NamedHandler {
    /// Tags `handler` with `id`
    pub fn new(id: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            id: id.into(),
            handler,
        }
    }

    /// Configured identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The handler itself
    pub fn handler(&self) -> &Arc<dyn EventHandler> {
        &self.handler
    }
}

impl fmt::Debug for NamedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedHandler").field("id", &self.id).finish()
    }
}

/// Immutable set of handlers, identified by configured name
///
/// Cloning is cheap; all clones share the same handler instances.
#[derive(Clone, Debug, Default)]
pub struct HandlerSet {
    handlers: Arc<[NamedHandler]>,
}

impl HandlerSet {
    /// Builds a set, keeping the first handler for each identifier
    pub fn new(handlers: impl IntoIterator<Item = NamedHandler>) -> Self {
        let mut unique: Vec<NamedHandler> = Vec::new();
        for handler in handlers {
            if !unique.iter().any(|h| h.id == handler.id) {
                unique.push(handler);
            }
        }
        Self {
            handlers: unique.into(),
        }
    }

    /// Iterates handlers in configured order
    pub fn iter(&self) -> impl Iterator<Item = &NamedHandler> {
        self.handlers.iter()
    }

    /// Handler identifiers in configured order
    pub fn ids(&self) -> Vec<&str> {
        self.handlers.iter().map(NamedHandler::id).collect()
    }

    /// Number of handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no handlers are configured
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
