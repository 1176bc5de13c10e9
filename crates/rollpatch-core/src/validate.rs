//! Post-patch validation
//!
//! Runs after the host is back in service: failed-unit scan (warning
//! only), Ready condition for cluster members (fatal on timeout), and the
//! optional operator post-hook (warning only, the host is already live).

use std::sync::Arc;

use rollpatch_exec::command::Cmd;
use rollpatch_exec::traits::RemoteExecutor;
use rollpatch_k8s::traits::NodeController;
use tracing::{debug, info, instrument, warn};

use crate::config::RunConfig;
use crate::error::HostError;
use crate::preflight::PROBE_TIMEOUT;

/// Post-patch validation for a single host
pub struct PostValidator {
    executor: Arc<dyn RemoteExecutor>,
    node_controller: Arc<dyn NodeController>,
    config: Arc<RunConfig>,
}

impl PostValidator {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        node_controller: Arc<dyn NodeController>,
        config: Arc<RunConfig>,
    ) -> Self {
        Self {
            executor,
            node_controller,
            config,
        }
    }

    /// Validate the host; `node` is its cluster node name when it is a
    /// member. Returns accumulated warnings.
    #[instrument(skip(self))]
    pub async fn run(&self, host: &str, node: Option<&str>) -> Result<Vec<String>, HostError> {
        let mut warnings = Vec::new();

        match self.failed_services().await {
            Ok(units) if units.is_empty() => debug!(host, "no failed services"),
            Ok(units) => {
                warn!(host, count = units.len(), units = ?units, "failed services after patching");
                warnings.push(format!(
                    "{} failed service(s): {}",
                    units.len(),
                    units.join(", ")
                ));
            }
            Err(e) => warnings.push(format!("could not list failed services: {e}")),
        }

        if let Some(node) = node {
            self.node_controller
                .wait_ready(
                    node,
                    self.config.timeouts.ready_total,
                    self.config.timeouts.ready_poll,
                )
                .await
                .map_err(|e| HostError::NodeNotReady(e.to_string()))?;
        }

        if let Some(hook) = &self.config.post_hook {
            if self.config.dry_run {
                info!(host, hook = %hook, "[DRY-RUN] would run post-hook");
            } else {
                match self.executor.run(hook).await {
                    Ok(result) if result.success() => debug!(host, hook = %hook, "post-hook ok"),
                    Ok(result) => warnings.push(format!("post-hook exited {}", result.status)),
                    Err(e) => warnings.push(format!("post-hook failed to run: {e}")),
                }
            }
        }

        Ok(warnings)
    }

    /// Failed systemd units on the host
    async fn failed_services(&self) -> Result<Vec<String>, HostError> {
        let cmd = Cmd::new("systemctl").args(["--failed", "--no-legend", "--plain"]);
        let result = self
            .executor
            .run_with_timeout(&cmd.render(), PROBE_TIMEOUT)
            .await
            .map_err(|e| HostError::Exec(e.to_string()))?;

        if !result.success() {
            return Err(HostError::Exec(format!(
                "systemctl exited {}",
                result.status
            )));
        }

        Ok(result
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                line.split_whitespace()
                    .next()
                    .unwrap_or(line)
                    .to_string()
            })
            .collect())
    }
}
