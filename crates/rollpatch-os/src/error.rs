//! Error types for rollpatch-os

use thiserror::Error;

/// Errors that can occur during OS-level operations
#[derive(Error, Debug, Clone)]
pub enum OsError {
    /// No supported package manager / unknown distribution
    #[error("unsupported operating system: {0}")]
    UnsupportedOs(String),

    /// Another process holds the package manager lock
    #[error("package manager lock held: {0}")]
    LockHeld(String),

    /// Repository metadata refresh failed
    #[error("repository unavailable: {0}")]
    RepositoryUnavailable(String),

    /// Package upgrade exited non-zero
    #[error("package update failed with status {status}: {detail}")]
    UpdateFailed {
        /// Remote exit status
        status: i32,
        /// Captured stderr tail
        detail: String,
    },

    /// A read-only probe (busy check, reboot marker) failed
    #[error("probe failed: {0}")]
    ProbeFailed(String),

    /// Transport-level failure from the remote executor
    #[error("execution error: {0}")]
    Execution(String),
}
