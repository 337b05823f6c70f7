//! Instance identity on disk
//!
//! A running watcher owns `<runtime dir>/dropwatch/<instance>.pid`. The file
//! holds the pid on the first line and the process identity on the second;
//! `stop` and `status` find the process through it.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

/// Contents of a pid file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidRecord {
    /// Process id of the owner
    pub pid: i32,
    /// `<pid>@<hostname>` of the owner
    pub identity: String,
}

impl PidRecord {
    fn parse(content: &str) -> Option<Self> {
        let mut lines = content.lines();
        let pid = lines.next()?.trim().parse::<i32>().ok()?;
        if pid <= 0 {
            return None;
        }
        let identity = lines.next().unwrap_or_default().trim().to_string();
        Some(Self { pid, identity })
    }

    fn render(&self) -> String {
        format!("{}\n{}\n", self.pid, self.identity)
    }
}

/// Location of the pid file for `instance`
///
/// Prefers `$XDG_RUNTIME_DIR`, then the local data directory, then the
/// system temporary directory.
pub fn pid_file_path(instance: &str) -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("dropwatch")
        .join(format!("{instance}.pid"))
}

/// Reads a pid file; `Ok(None)` when it does not exist or is unparseable
pub fn read_pid_file(path: &Path) -> Result<Option<PidRecord>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let record = PidRecord::parse(&content);
            if record.is_none() {
                warn!(path = %path.display(), "Ignoring malformed pid file");
            }
            Ok(record)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("Failed to read pid file {}", path.display()))
        }
    }
}

/// Whether a process with `pid` exists
pub fn is_alive(pid: i32) -> bool {
    // SAFETY: signal 0 performs only the existence and permission check.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Sends SIGTERM to `pid`
pub fn terminate(pid: i32) -> io::Result<()> {
    // SAFETY: plain syscall wrapper; pid comes from a parsed, positive value.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Ownership of a pid file for the lifetime of the run
///
/// The file is removed on drop, but only while it still names this process.
#[derive(Debug)]
pub struct PidFileGuard {
    path: PathBuf,
    record: PidRecord,
}

impl PidFileGuard {
    /// Claims `path` for the current process
    ///
    /// A stale file (dead owner or unparseable) is replaced.
    ///
    /// # Errors
    /// Fails if another live process owns the file or it cannot be written.
    pub fn acquire(path: impl Into<PathBuf>, identity: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let own_pid = std::process::id() as i32;

        if let Some(existing) = read_pid_file(&path)? {
            if existing.pid != own_pid && is_alive(existing.pid) {
                bail!(
                    "Instance already running as {} (pid file {})",
                    existing.identity,
                    path.display()
                );
            }
            debug!(path = %path.display(), stale_pid = existing.pid, "Replacing stale pid file");
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let record = PidRecord {
            pid: own_pid,
            identity: identity.into(),
        };
        fs::write(&path, record.render())
            .with_context(|| format!("Failed to write pid file {}", path.display()))?;
        debug!(path = %path.display(), pid = own_pid, "Pid file written");

        Ok(Self { path, record })
    }

    /// Path of the owned file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record written to the file
    pub fn record(&self) -> &PidRecord {
        &self.record
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        match read_pid_file(&self.path) {
            Ok(Some(current)) if current.pid == self.record.pid => {
                if let Err(err) = fs::remove_file(&self.path) {
                    warn!(path = %self.path.display(), error = %err, "Failed to remove pid file");
                }
            }
            Ok(_) => debug!(path = %self.path.display(), "Pid file no longer ours, leaving it"),
            Err(err) => warn!(error = %err, "Failed to inspect pid file on exit"),
        }
    }
}
