// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Run mutual exclusion.
//!
//! Datemirror is meant to be fired from cron, so two invocations can race
//! whenever a run outlives the cron interval. A lock file holding the owning
//! process id keeps runs exclusive: acquisition fails while the recorded pid
//! is alive, and goes through by overwriting when the file is missing, names
//! a dead process, or holds garbage.
//!
//! The check-then-write window between the liveness probe and the overwrite
//! is an accepted limitation of this scheme. A cron-scheduled personal tool
//! does not need a linearizable lock; it needs the common overlap case
//! caught, and stale locks from crashed runs cleared without operator help.

use nix::{sys::signal::kill, unistd::Pid};
use std::{fs, path::PathBuf, process};
use tracing::{debug, warn};

/// Scoped holder of the run lock.
///
/// Acquired with [`RunLock::try_acquire`]. The lock file is removed when the
/// handle drops, on every exit path, including unwinding out of a failed
/// run.
#[derive(Debug)]
pub struct RunLock {
    lock_path: PathBuf,
}

impl RunLock {
    /// Acquire the run lock, recording the current process id.
    ///
    /// # Errors
    ///
    /// - Return [`LockError::AlreadyRunning`] if the lock file names a live
    ///   process.
    /// - Return [`LockError::Read`] or [`LockError::Write`] if the lock file
    ///   cannot be inspected or claimed.
    pub fn try_acquire(lock_path: impl Into<PathBuf>) -> Result<Self> {
        let lock_path = lock_path.into();

        match fs::read_to_string(&lock_path) {
            Ok(contents) => match contents.trim().parse::<i32>() {
                // INVARIANT: Only positive pids name a process. Zero and
                // negative values address process groups under kill(2) and
                // would probe as alive forever.
                Ok(pid) if pid > 0 => {
                    if pid_is_alive(pid) {
                        return Err(LockError::AlreadyRunning { pid });
                    }
                    warn!("clearing stale lock from dead process {pid}");
                }
                _ => warn!("clearing garbled lock file {:?}", lock_path.display()),
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(LockError::Read {
                    source: err,
                    lock_path,
                })
            }
        }

        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|err| LockError::Write {
                source: err,
                lock_path: lock_path.clone(),
            })?;
        }

        let pid = process::id();
        fs::write(&lock_path, format!("{pid}\n")).map_err(|err| LockError::Write {
            source: err,
            lock_path: lock_path.clone(),
        })?;
        debug!("acquired run lock at {:?} as pid {pid}", lock_path.display());

        Ok(Self { lock_path })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Release is best effort. A leftover file only costs one liveness
        // probe on the next run.
        if let Err(err) = fs::remove_file(&self.lock_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove lock file {:?}: {err}", self.lock_path.display());
            }
        }
    }
}

/// Probe a process id for liveness with signal 0.
fn pid_is_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Run lock error types.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another datemirror instance holds the lock.
    #[error("another sync is already running as pid {pid}")]
    AlreadyRunning { pid: i32 },

    /// Lock file cannot be read from.
    #[error("failed to read lock file at {:?}", lock_path.display())]
    Read {
        #[source]
        source: std::io::Error,
        lock_path: PathBuf,
    },

    /// Lock file cannot be written to.
    #[error("failed to write lock file at {:?}", lock_path.display())]
    Write {
        #[source]
        source: std::io::Error,
        lock_path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = LockError> = std::result::Result<T, E>;
