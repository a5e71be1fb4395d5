//! Exclusive lock around the device table.
//!
//! A file-backed table is shared between processes, so the lock is an
//! advisory `flock(2)` on a sidecar `.lock` file. Each acquisition opens
//! its own file description, which also makes the lock exclusive between
//! threads of one process. In-memory tables only need a process-local
//! mutex.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{StateError, StateResult};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Named mutual-exclusion primitive with a bounded wait.
#[derive(Debug)]
pub enum TableLock {
    /// `flock` on a lock file, effective across processes.
    File { path: PathBuf, timeout: Duration },
    /// Process-local lock for in-memory tables.
    Local {
        mutex: parking_lot::Mutex<()>,
        timeout: Duration,
    },
}

/// Held lock; released on drop.
#[must_use = "the table lock is released as soon as the guard is dropped"]
pub enum LockGuard<'a> {
    File(File),
    Local(parking_lot::MutexGuard<'a, ()>),
}

impl TableLock {
    /// Lock file guarding the database at `table_path` (`<table_path>.lock`).
    pub fn for_table(table_path: &Path, timeout: Duration) -> Self {
        let mut name = table_path.as_os_str().to_owned();
        name.push(".lock");
        TableLock::File {
            path: PathBuf::from(name),
            timeout,
        }
    }

    pub fn local(timeout: Duration) -> Self {
        TableLock::Local {
            mutex: parking_lot::Mutex::new(()),
            timeout,
        }
    }

    /// Human-readable name used in errors and logs.
    pub fn name(&self) -> String {
        match self {
            TableLock::File { path, .. } => path.display().to_string(),
            TableLock::Local { .. } => "in-process".to_string(),
        }
    }

    /// Acquire the lock, waiting at most the configured timeout.
    pub fn acquire(&self) -> StateResult<LockGuard<'_>> {
        match self {
            TableLock::File { path, timeout } => acquire_file(path, *timeout).map(LockGuard::File),
            TableLock::Local { mutex, timeout } => mutex
                .try_lock_for(*timeout)
                .map(LockGuard::Local)
                .ok_or_else(|| StateError::LockTimeout {
                    name: self.name(),
                    waited: *timeout,
                }),
        }
    }
}

fn acquire_file(path: &Path, timeout: Duration) -> StateResult<File> {
    let lock_err = |source| StateError::Lock {
        path: path.to_path_buf(),
        source,
    };
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(lock_err)?;

    let started = Instant::now();
    loop {
        // SAFETY: `file` owns a valid descriptor for the duration of the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            trace!(path = %path.display(), "table lock acquired");
            return Ok(file);
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::WouldBlock {
            return Err(lock_err(err));
        }
        let waited = started.elapsed();
        if waited >= timeout {
            debug!(path = %path.display(), ?waited, "table lock wait timed out");
            return Err(StateError::LockTimeout {
                name: path.display().to_string(),
                waited,
            });
        }
        std::thread::sleep(POLL_INTERVAL.min(timeout - waited));
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let LockGuard::File(file) = self {
            // Closing the descriptor releases the lock as well; unlock
            // explicitly so the release does not depend on drop order.
            // SAFETY: the descriptor is still owned by `file`.
            unsafe {
                libc::flock(file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}
