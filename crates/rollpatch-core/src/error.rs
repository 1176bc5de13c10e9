//! Error taxonomy for patch runs

use std::time::Duration;

use thiserror::Error;

/// Failures that stop a single host's pipeline.
///
/// Everything here is fatal to that host (validation-stage findings are
/// warnings on the record instead); nothing is retried automatically.
#[derive(Error, Debug, Clone)]
pub enum HostError {
    /// Host did not answer the reachability probe
    #[error("host unreachable: {0}")]
    Unreachable(String),

    /// Root filesystem too full to patch safely
    #[error("root filesystem at {usage}% exceeds the {limit}% critical threshold")]
    InsufficientDisk {
        /// Observed usage percentage
        usage: u8,
        /// Configured critical threshold
        limit: u8,
    },

    /// Another process holds the package manager lock
    #[error("package manager busy: {0}")]
    PackageManagerBusy(String),

    /// Operator-supplied pre-hook exited non-zero
    #[error("pre-hook failed with status {status}")]
    HookFailed {
        /// Hook exit status
        status: i32,
    },

    /// Drain rejected or timed out
    #[error("drain failed: {0}")]
    Drain(String),

    /// Package upgrade exited non-zero
    #[error("package update failed: {0}")]
    PackageUpdate(String),

    /// Host never came back after the reboot
    #[error("host did not return within {timeout:?} of reboot")]
    RebootTimeout {
        /// Total recovery bound that was exceeded
        timeout: Duration,
    },

    /// Node Ready condition not observed in time
    #[error("node not ready: {0}")]
    NodeNotReady(String),

    /// OS probe (family detection, busy check, reboot marker) failed
    #[error("os probe failed: {0}")]
    Os(String),

    /// Remote execution failed outside the cases above
    #[error("remote execution failed: {0}")]
    Exec(String),
}

/// Orchestration-level errors (not tied to a single host's outcome)
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Actor communication error
    #[error("actor communication error: {0}")]
    Actor(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}
