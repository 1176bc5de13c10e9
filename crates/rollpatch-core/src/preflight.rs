//! Preflight checks
//!
//! Read-only validation that runs before a host is mutated. Any failing
//! check fails the host without side effects.

use std::sync::Arc;
use std::time::Duration;

use rollpatch_exec::command::Cmd;
use rollpatch_exec::traits::RemoteExecutor;
use rollpatch_os::traits::OsAdapter;
use tracing::{debug, error, info, instrument};

use crate::config::RunConfig;
use crate::error::HostError;

/// Root filesystem usage at or above this percentage fails preflight
pub const DISK_CRITICAL_PCT: u8 = 90;

/// Bound for quick read-only probes
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pre-mutation validation for a single host
pub struct PreflightChecker {
    executor: Arc<dyn RemoteExecutor>,
    config: Arc<RunConfig>,
}

impl PreflightChecker {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: Arc<RunConfig>) -> Self {
        Self { executor, config }
    }

    /// Probe the host within the connect bound
    #[instrument(skip(self))]
    pub async fn reachability(&self, host: &str) -> Result<(), HostError> {
        let result = self
            .executor
            .run_with_timeout("echo ok", self.config.timeouts.connect)
            .await
            .map_err(|e| HostError::Unreachable(e.to_string()))?;

        if !result.success() {
            return Err(HostError::Unreachable(format!(
                "probe exited {}",
                result.status
            )));
        }

        debug!(host, "host reachable");
        Ok(())
    }

    /// Verify root filesystem usage is below the critical threshold
    #[instrument(skip(self))]
    pub async fn disk_headroom(&self, host: &str) -> Result<(), HostError> {
        let cmd = Cmd::new("df").args(["-P", "/"]);
        let result = self
            .executor
            .run_with_timeout(&cmd.render(), PROBE_TIMEOUT)
            .await
            .map_err(|e| HostError::Exec(e.to_string()))?;

        if !result.success() {
            return Err(HostError::Exec(format!(
                "df exited {}: {}",
                result.status,
                result.stderr.trim()
            )));
        }

        let usage = parse_root_usage(&result.stdout)
            .ok_or_else(|| HostError::Exec("could not parse df output".to_string()))?;

        if usage >= DISK_CRITICAL_PCT {
            return Err(HostError::InsufficientDisk {
                usage,
                limit: DISK_CRITICAL_PCT,
            });
        }

        debug!(host, usage, "disk headroom ok");
        Ok(())
    }

    /// Verify no other process holds the package manager lock
    #[instrument(skip(self, adapter))]
    pub async fn package_manager_idle(
        &self,
        host: &str,
        adapter: &dyn OsAdapter,
    ) -> Result<(), HostError> {
        let busy = adapter
            .package_manager_busy()
            .await
            .map_err(|e| HostError::Os(e.to_string()))?;

        if busy {
            return Err(HostError::PackageManagerBusy(format!(
                "another {} package manager process is active",
                adapter.family()
            )));
        }

        debug!(host, "package manager idle");
        Ok(())
    }

    /// Run the operator pre-hook, when configured; non-zero exit fails
    /// preflight
    #[instrument(skip(self))]
    pub async fn pre_hook(&self, host: &str) -> Result<(), HostError> {
        let Some(hook) = &self.config.pre_hook else {
            return Ok(());
        };

        if self.config.dry_run {
            info!(host, hook = %hook, "[DRY-RUN] would run pre-hook");
            return Ok(());
        }

        let result = self
            .executor
            .run(hook)
            .await
            .map_err(|e| HostError::Exec(e.to_string()))?;

        if !result.success() {
            error!(host, hook = %hook, status = result.status, "pre-hook failed");
            return Err(HostError::HookFailed {
                status: result.status,
            });
        }

        debug!(host, hook = %hook, "pre-hook ok");
        Ok(())
    }
}

/// Extract the use% column for `/` from `df -P /` output
fn parse_root_usage(output: &str) -> Option<u8> {
    let line = output.lines().nth(1)?;
    let field = line.split_whitespace().nth(4)?;
    field.trim_end_matches('%').parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_root_usage() {
        let output = "Filesystem     1024-blocks     Used Available Capacity Mounted on\n\
                      /dev/sda1         41152736 16460436  22774492      42% /\n";
        assert_eq!(parse_root_usage(output), Some(42));
    }

    #[test]
    fn test_parse_root_usage_full_disk() {
        let output = "Filesystem 1024-blocks Used Available Capacity Mounted on\n\
                      /dev/vda1 10218772 9707834 0 100% /\n";
        assert_eq!(parse_root_usage(output), Some(100));
    }

    #[test]
    fn test_parse_root_usage_garbage() {
        assert_eq!(parse_root_usage(""), None);
        assert_eq!(parse_root_usage("no table here"), None);
    }
}
