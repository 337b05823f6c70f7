//! Log subscriber setup

use std::{fs::OpenOptions, path::Path, sync::Mutex};

use anyhow::{anyhow, Context, Result};
use dropwatch_core::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Level used when `RUST_LOG` is unset
///
/// Each `-v` raises the configured level one step, up to `trace`.
pub fn effective_level(configured: &str, verbose: u8) -> &str {
    const LADDER: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    let Some(start) = LADDER.iter().position(|level| *level == configured) else {
        return configured;
    };
    LADDER[(start + usize::from(verbose)).min(LADDER.len() - 1)]
}

/// Installs the global subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &LoggingConfig, verbose: u8) -> Result<()> {
    let level = effective_level(&config.level, verbose);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    let installed = match &config.file {
        None => match config.format {
            LogFormat::Text => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
        },
        Some(path) => {
            let file = open_log_file(path)?;
            let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
            match config.format {
                LogFormat::Text => builder.try_init(),
                LogFormat::Json => builder.json().try_init(),
            }
        }
    };
    installed.map_err(|err| anyhow!("Failed to install log subscriber: {err}"))
}

/// Installs a stderr subscriber for the short-lived control commands
///
/// Stdout stays reserved for their JSON output.
pub fn init_stderr(verbose: u8) -> Result<()> {
    let level = effective_level("warn", verbose);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("Failed to install log subscriber: {err}"))
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}
