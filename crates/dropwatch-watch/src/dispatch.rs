//! Per-file fan-out to every configured handler
//!
//! Each handler call is isolated: an error or a panic in one handler is
//! logged with the handler id, event kind and path, and the remaining handlers
//! still run for the same file.

use std::{
    future::Future,
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
};

use dropwatch_core::{ports::HandlerSet, NotificationEvent};
use futures_util::FutureExt;
use tracing::{debug, error};

use crate::pool::panic_message;

/// Counts of handler outcomes for one file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Handlers that returned `Ok`
    pub succeeded: usize,
    /// Handlers that returned an error or panicked
    pub failed: usize,
}

/// Invokes every handler in `handlers` once for `path`
pub async fn dispatch(
    handlers: &HandlerSet,
    event: &NotificationEvent,
    path: &Path,
) -> DispatchSummary {
    let mut summary = DispatchSummary::default();

    for named in handlers.iter() {
        let call = AssertUnwindSafe(named.handler().handle(event, path));
        match call.catch_unwind().await {
            Ok(Ok(())) => {
                debug!(handler = named.id(), path = %path.display(), "Handler completed");
                summary.succeeded += 1;
            }
            Ok(Err(err)) => {
                error!(
                    handler = named.id(),
                    kind = %event.kind,
                    path = %path.display(),
                    error = %err,
                    "Handler failed"
                );
                summary.failed += 1;
            }
            Err(panic) => {
                error!(
                    handler = named.id(),
                    kind = %event.kind,
                    path = %path.display(),
                    panic = %panic_message(&*panic),
                    "Handler panicked"
                );
                summary.failed += 1;
            }
        }
    }

    summary
}

/// Builds the owned unit submitted to the worker pool for one file
pub fn dispatch_unit(
    handlers: HandlerSet,
    event: NotificationEvent,
    path: PathBuf,
) -> impl Future<Output = ()> + Send + 'static {
    async move {
        dispatch(&handlers, &event, &path).await;
    }
}
