//! Advisory lock over a filesystem path
//!
//! The lock is a marker file created with `create_new`. Its presence is the
//! only mutex signal; the `pid=` line written into it is for humans inspecting
//! a leftover lock. A marker left behind by a crashed process is never expired
//! automatically and has to be removed by hand.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Default interval between acquisition attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why a lock wait gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The deadline passed before the lock was free
    DeadlineExceeded,
    /// The caller cancelled the wait
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::DeadlineExceeded => f.write_str("deadline exceeded"),
            StopReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Errors that can occur while acquiring a lock
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock could not be acquired before the deadline or cancellation
    #[error("timed out waiting for lock {}: {reason}", .path.display())]
    Timeout { path: PathBuf, reason: StopReason },

    /// Creating the marker file failed for a reason other than contention
    #[error("failed to create lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// When a lock wait must stop: a point in time plus optional cancellation
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    cancel: Option<CancellationToken>,
}

impl Deadline {
    /// A deadline `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
            cancel: None,
        }
    }

    /// Also stop waiting as soon as `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Returns the reason to stop, if any
    fn check(&self) -> Option<StopReason> {
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Some(StopReason::Cancelled);
        }
        if Instant::now() >= self.at {
            return Some(StopReason::DeadlineExceeded);
        }
        None
    }

    fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

/// An advisory lock at a fixed path
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    poll_interval: Duration,
}

impl FileLock {
    /// Creates a lock handle for `path` with the default polling interval
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides how long to sleep between attempts
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Path of the marker file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until the lock is acquired or `deadline` stops the wait
    ///
    /// Each sleep is capped by the time left on the deadline, so a deadline
    /// or cancellation is noticed within one polling interval. Sleeps the
    /// calling thread; async callers use [`FileLock::acquire_async`].
    ///
    /// # Errors
    /// * `LockError::Timeout` if the deadline passes or the wait is cancelled
    /// * `LockError::Io` if the marker cannot be created for another reason
    pub fn acquire(&self, deadline: &Deadline) -> Result<LockGuard, LockError> {
        loop {
            if let Some(guard) = self.try_acquire()? {
                return Ok(guard);
            }
            self.check_deadline(deadline)?;
            thread::sleep(self.poll_interval.min(deadline.remaining()));
        }
    }

    /// Like [`FileLock::acquire`], but waits with `tokio::time::sleep`
    ///
    /// The runtime thread stays free between attempts, so the task holding
    /// the lock can finish on the same runtime. A cancelled token ends the
    /// current sleep immediately.
    pub async fn acquire_async(&self, deadline: &Deadline) -> Result<LockGuard, LockError> {
        loop {
            if let Some(guard) = self.try_acquire()? {
                return Ok(guard);
            }
            self.check_deadline(deadline)?;

            let pause = tokio::time::sleep(self.poll_interval.min(deadline.remaining()));
            match &deadline.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = pause => {}
                    }
                }
                None => pause.await,
            }
        }
    }

    fn try_acquire(&self) -> Result<Option<LockGuard>, LockError> {
        match self.try_create() {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "lock acquired");
                Ok(Some(LockGuard {
                    path: self.path.clone(),
                    released: false,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn check_deadline(&self, deadline: &Deadline) -> Result<(), LockError> {
        match deadline.check() {
            Some(reason) => {
                tracing::warn!(path = %self.path.display(), %reason, "giving up on lock");
                Err(LockError::Timeout {
                    path: self.path.clone(),
                    reason,
                })
            }
            None => Ok(()),
        }
    }

    fn try_create(&self) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        // Diagnostic only; a failed write still leaves the lock held.
        let _ = write!(file, "pid={}", std::process::id());
        Ok(())
    }
}

/// A held lock; the marker is removed on `release` or drop
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    released: bool,
}

impl LockGuard {
    /// Path of the marker file this guard owns
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock by deleting the marker file
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        } else {
            tracing::debug!(path = %self.path.display(), "lock released");
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.remove();
    }
}
