//! Dropwatch Daemon - drop-folder watcher process
//!
//! `dropwatchd run` (the default) loads the `main` profile, resolves the
//! configured handlers, claims the instance pid file and watches until
//! SIGINT/SIGTERM or until every watched directory is gone. The remaining
//! subcommands control or inspect an instance:
//!
//! - `stop`   - send SIGTERM to the instance named in the pid file
//! - `status` - report whether the instance is alive
//! - `check`  - validate the configuration and print it as JSON

mod instance;
mod logging;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use dropwatch_core::config::{ConfigStore, LoggingConfig, WatchConfig};
use dropwatch_handlers::HandlerRegistry;
use dropwatch_watch::{service::process_identity, LoopExit, WatchService};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::instance::{is_alive, pid_file_path, read_pid_file, terminate, PidFileGuard};

// ============================================================================
// Command line
// ============================================================================

/// Drop-folder watcher
#[derive(Debug, Parser)]
#[command(name = "dropwatchd", version, about = "Watch a drop folder and hand new files to handlers")]
struct Cli {
    /// Directory holding the `<profile>.yaml` configuration files
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Instance name, used for the pid file
    #[arg(long, global = true, default_value = "main")]
    instance: String,

    /// Raise log verbosity one level per occurrence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start watching (default)
    Run,
    /// Stop a running instance
    Stop,
    /// Show whether an instance is running
    Status,
    /// Validate configuration and handlers
    Check,
}

impl Cli {
    fn store(&self) -> ConfigStore {
        ConfigStore::new(
            self.config_dir
                .clone()
                .unwrap_or_else(ConfigStore::default_dir),
        )
    }
}

// ============================================================================
// run
// ============================================================================

async fn run(cli: &Cli) -> Result<()> {
    let store = cli.store();

    let logging_config = LoggingConfig::from_profile(&*store.main()?)?;
    let errors = logging_config.validate();
    if !errors.is_empty() {
        bail!(dropwatch_core::ConfigError::Invalid(errors));
    }
    logging::init(&logging_config, cli.verbose)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_dir = ?store.dir(),
        instance = %cli.instance,
        "Dropwatch daemon starting"
    );

    let config = WatchConfig::load(&store)?;
    let handlers = HandlerRegistry::default().resolve(&config.event_handler_classes, &store)?;

    let _pid_file = PidFileGuard::acquire(pid_file_path(&cli.instance), process_identity())?;

    let service = WatchService::start(&config, handlers).await?;
    tokio::spawn(shutdown_signal(service.cancellation_token()));

    match service.wait().await? {
        LoopExit::Cancelled => info!("Dropwatch daemon shut down gracefully"),
        LoopExit::TreeExhausted => warn!("No watchable directories remain, exiting"),
        LoopExit::SourceClosed => warn!("Notification backend closed, exiting"),
    }
    Ok(())
}

/// Cancels `token` on SIGINT or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
        _ = token.cancelled() => return,
    }

    token.cancel();
}

// ============================================================================
// stop / status / check
// ============================================================================

fn stop(instance: &str) -> Result<serde_json::Value> {
    let path = pid_file_path(instance);
    let record = match read_pid_file(&path)? {
        Some(record) if is_alive(record.pid) => record,
        _ => {
            return Ok(json!({
                "instance": instance,
                "stopped": false,
                "message": "not running",
            }))
        }
    };

    terminate(record.pid)
        .with_context(|| format!("Failed to signal {}", record.identity))?;
    info!(pid = record.pid, identity = %record.identity, "Sent SIGTERM");

    Ok(json!({
        "instance": instance,
        "stopped": true,
        "pid": record.pid,
        "identity": record.identity,
    }))
}

fn status(instance: &str) -> Result<serde_json::Value> {
    let path = pid_file_path(instance);
    let record = read_pid_file(&path)?;
    let running = record.as_ref().is_some_and(|r| is_alive(r.pid));

    Ok(json!({
        "instance": instance,
        "running": running,
        "pid": record.as_ref().filter(|_| running).map(|r| r.pid),
        "identity": record.as_ref().filter(|_| running).map(|r| r.identity.clone()),
        "pidFile": path,
    }))
}

fn check(store: &ConfigStore) -> Result<serde_json::Value> {
    let logging_config = LoggingConfig::from_profile(&*store.main()?)?;
    let mut errors = logging_config.validate();
    let config = WatchConfig::from_profile(&*store.main()?)?;
    errors.extend(config.validate());
    if !errors.is_empty() {
        bail!(dropwatch_core::ConfigError::Invalid(errors));
    }

    let handlers = HandlerRegistry::default().resolve(&config.event_handler_classes, store)?;

    Ok(json!({
        "configDir": store.dir(),
        "config": config,
        "logging": logging_config,
        "handlers": handlers.ids(),
    }))
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let report = match &cli.command {
        None | Some(Command::Run) => return run(&cli).await,
        Some(Command::Stop) => {
            logging::init_stderr(cli.verbose)?;
            stop(&cli.instance)?
        }
        Some(Command::Status) => {
            logging::init_stderr(cli.verbose)?;
            status(&cli.instance)?
        }
        Some(Command::Check) => {
            logging::init_stderr(cli.verbose)?;
            check(&cli.store())?
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
