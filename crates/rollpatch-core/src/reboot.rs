//! Reboot coordination
//!
//! Issues the delayed reboot when the OS asks for one and waits for the
//! host to come back, bounded by the configured recovery window. The
//! reboot command itself is never retried.

use std::sync::Arc;

use rollpatch_exec::command::Cmd;
use rollpatch_exec::traits::RemoteExecutor;
use rollpatch_os::traits::OsAdapter;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument};

use crate::config::RunConfig;
use crate::error::HostError;

/// Drives the reboot-and-recover stage for one host
pub struct RebootCoordinator {
    executor: Arc<dyn RemoteExecutor>,
    adapter: Arc<dyn OsAdapter>,
    config: Arc<RunConfig>,
    use_sudo: bool,
}

impl RebootCoordinator {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        adapter: Arc<dyn OsAdapter>,
        config: Arc<RunConfig>,
        use_sudo: bool,
    ) -> Self {
        Self {
            executor,
            adapter,
            config,
            use_sudo,
        }
    }

    /// Reboot the host if required and wait for it to return.
    ///
    /// Returns `Ok(true)` when a reboot happened, `Ok(false)` for the
    /// no-op paths (skip flag, no reboot required, dry run).
    #[instrument(skip(self))]
    pub async fn run(&self, host: &str) -> Result<bool, HostError> {
        if self.config.skip_reboot {
            debug!(host, "reboot disabled for this run");
            return Ok(false);
        }

        let required = self
            .adapter
            .reboot_required()
            .await
            .map_err(|e| HostError::Os(e.to_string()))?;

        if !required {
            debug!(host, "no reboot required");
            return Ok(false);
        }

        if self.config.dry_run {
            info!(host, "[DRY-RUN] would reboot host");
            return Ok(false);
        }

        let cmd = Cmd::new("shutdown")
            .args(["-r", "+1", "fleet patch reboot"])
            .sudo_if(self.use_sudo);

        info!(host, "issuing delayed reboot");
        let issued_at = Instant::now();

        let result = self
            .executor
            .run(&cmd.render())
            .await
            .map_err(|e| HostError::Exec(e.to_string()))?;

        if !result.success() {
            return Err(HostError::Exec(format!(
                "reboot command exited {}: {}",
                result.status,
                result.stderr.trim()
            )));
        }

        // The host stays reachable until the scheduled shutdown fires;
        // probing before the grace period elapses would false-positive.
        debug!(
            host,
            grace = ?self.config.timeouts.reboot_grace,
            "waiting for host to go down"
        );
        sleep(self.config.timeouts.reboot_grace).await;

        let deadline = issued_at + self.config.timeouts.reboot_total;
        loop {
            let probe = self
                .executor
                .run_with_timeout("echo ok", self.config.timeouts.connect)
                .await;

            if let Ok(result) = probe
                && result.success()
            {
                info!(host, elapsed = ?issued_at.elapsed(), "host is back after reboot");
                return Ok(true);
            }

            if Instant::now() >= deadline {
                return Err(HostError::RebootTimeout {
                    timeout: self.config.timeouts.reboot_total,
                });
            }

            sleep(self.config.timeouts.reboot_poll).await;
        }
    }
}
