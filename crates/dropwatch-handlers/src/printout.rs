//! Printout handler
//!
//! Writes one line per new file to stdout. Useful as a smoke test of a
//! deployment and as the default when no handler is configured.

use std::{
    io::{self, Write},
    path::Path,
    sync::Arc,
};

use async_trait::async_trait;
use dropwatch_core::{config::ConfigStore, ports::EventHandler, HandlerError, NotificationEvent};
use tracing::info;

/// Identifier under which the printout handler is registered
pub const PRINTOUT_ID: &str = "printout";

/// Prints every created file to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintoutHandler;

impl PrintoutHandler {
    /// Registry constructor; the printout handler has no configuration
    pub fn from_config(_store: &ConfigStore) -> anyhow::Result<Arc<dyn EventHandler>> {
        Ok(Arc::new(PrintoutHandler))
    }

    /// Line printed for one file
    pub fn format_line(event: &NotificationEvent, path: &Path) -> String {
        format!("Event kind: {}. File affected: {}.", event.kind, path.display())
    }
}

#[async_trait]
impl EventHandler for PrintoutHandler {
    async fn handle(&self, event: &NotificationEvent, path: &Path) -> Result<(), HandlerError> {
        info!(kind = %event.kind, path = %path.display(), "New file");

        let line = Self::format_line(event, path);
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{line}")
            .and_then(|()| stdout.flush())
            .map_err(|e| HandlerError::fatal(format!("cannot write to stdout: {e}")))
    }
}
