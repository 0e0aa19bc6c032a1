//! Advisory file locking
//!
//! Readers take a shared lock, the single writer an exclusive one. Locks
//! are acquired without blocking and retried a bounded number of times
//! with linear backoff, so a stuck peer surfaces as
//! [`LockError::Contention`] instead of a hang.
//!
//! A [`FileLock`] borrows the locked file and releases the lock when
//! dropped.

mod errors;

pub use errors::{LockError, LockResult};

use std::fs::File;
use std::io;
use std::thread;
use std::time::Duration;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::observability::{log_event_with_fields, Event};

/// Lock mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many readers may hold it at once
    Shared,
    /// Held by at most one writer, excludes readers
    Exclusive,
}

impl LockMode {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Shared => "shared",
            LockMode::Exclusive => "exclusive",
        }
    }
}

/// Retry behaviour for lock acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPolicy {
    /// Retries after the first failed attempt
    pub retries: u32,
    /// Base backoff; the n-th retry waits `n * backoff_ms`
    pub backoff_ms: u64,
}

impl LockPolicy {
    /// Default retry count
    pub const DEFAULT_RETRIES: u32 = 5;
    /// Default backoff step in milliseconds
    pub const DEFAULT_BACKOFF_MS: u64 = 20;

    /// Create a policy
    pub fn new(retries: u32, backoff_ms: u64) -> Self {
        Self { retries, backoff_ms }
    }

    /// A single attempt, no retries
    pub fn no_wait() -> Self {
        Self::new(0, 0)
    }
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RETRIES, Self::DEFAULT_BACKOFF_MS)
    }
}

/// RAII guard for an advisory lock on a file
#[derive(Debug)]
pub struct FileLock<'a> {
    file: &'a File,
    mode: LockMode,
}

impl<'a> FileLock<'a> {
    /// Acquire a shared lock on `file`
    pub fn shared(file: &'a File, policy: &LockPolicy) -> LockResult<Self> {
        Self::acquire(file, LockMode::Shared, policy)
    }

    /// Acquire an exclusive lock on `file`
    pub fn exclusive(file: &'a File, policy: &LockPolicy) -> LockResult<Self> {
        Self::acquire(file, LockMode::Exclusive, policy)
    }

    /// Mode this guard holds
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    fn acquire(file: &'a File, mode: LockMode, policy: &LockPolicy) -> LockResult<Self> {
        let mut attempt = 0u32;
        loop {
            // Fully qualified: std's inherent File locking methods would
            // otherwise shadow the fs2 trait on newer toolchains.
            let result = match mode {
                LockMode::Shared => FileExt::try_lock_shared(file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(file),
            };

            match result {
                Ok(()) => return Ok(Self { file, mode }),
                Err(e) if is_contended(&e) => {
                    if attempt >= policy.retries {
                        return Err(LockError::Contention {
                            mode: mode.as_str(),
                            attempts: attempt + 1,
                        });
                    }
                    attempt += 1;
                    log_event_with_fields(
                        Event::LockContention,
                        &[("attempt", &attempt.to_string()), ("mode", mode.as_str())],
                    );
                    thread::sleep(Duration::from_millis(policy.backoff_ms * attempt as u64));
                }
                Err(e) => {
                    return Err(LockError::io(
                        format!("Failed to acquire {} lock", mode.as_str()),
                        e,
                    ))
                }
            }
        }
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.file);
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == fs2::lock_contended_error().kind()
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
