//! APT adapter (Debian/Ubuntu)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rollpatch_exec::command::Cmd;
use rollpatch_exec::traits::RemoteExecutor;
use tracing::{debug, info, instrument};

use crate::error::OsError;
use crate::traits::OsAdapter;
use crate::types::{OsFamily, UpdateOutcome, UpgradablePackage};

/// Bound for quick read-only probes
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for metadata refresh + full upgrade
const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(1800);

/// APT adapter for Debian-like hosts
pub struct AptAdapter {
    executor: Arc<dyn RemoteExecutor>,
    use_sudo: bool,
    update_timeout: Duration,
}

impl AptAdapter {
    /// Create a new APT adapter
    pub fn new(executor: Arc<dyn RemoteExecutor>, use_sudo: bool) -> Self {
        Self {
            executor,
            use_sudo,
            update_timeout: DEFAULT_UPDATE_TIMEOUT,
        }
    }

    /// Override the upgrade bound
    #[must_use]
    pub fn with_update_timeout(mut self, timeout: Duration) -> Self {
        self.update_timeout = timeout;
        self
    }

    /// Refresh package lists
    async fn refresh_metadata(&self) -> Result<(), OsError> {
        let cmd = Cmd::new("apt-get")
            .args(["update", "-qq"])
            .sudo_if(self.use_sudo);

        let result = self
            .executor
            .run_with_timeout(&cmd.render(), self.update_timeout)
            .await
            .map_err(|e| OsError::Execution(e.to_string()))?;

        if !result.success() {
            return Err(OsError::RepositoryUnavailable(tail(&result.stderr, 500)));
        }
        Ok(())
    }

    /// Parse `apt list --upgradable` output
    fn parse_upgradable(output: &str) -> Vec<UpgradablePackage> {
        let mut packages = Vec::new();

        for line in output.lines() {
            // Skip header and apt CLI warnings
            if line.is_empty() || line.starts_with("Listing") || line.starts_with("WARNING") {
                continue;
            }

            // package/suite version arch [upgradable from: oldversion]
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 2 {
                continue;
            }

            let name = parts[0].split('/').next().unwrap_or(parts[0]);
            let mut pkg = UpgradablePackage::new(name, parts[1]);

            if let Some(start) = line.find("[upgradable from: ")
                && let Some(end) = line[start..].find(']')
            {
                let from = &line[start + "[upgradable from: ".len()..start + end];
                pkg = pkg.with_current(from);
            }

            packages.push(pkg);
        }

        packages
    }

    /// Parse the apt summary line: "X upgraded, Y newly installed, Z to remove ..."
    fn parse_upgrade_summary(output: &str) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();

        for line in output.lines() {
            if !line.contains("upgraded,") {
                continue;
            }
            for part in line.split(',') {
                let part = part.trim();
                if let Some(n) = part.find(" upgraded")
                    && let Ok(num) = part[..n].trim().parse::<u32>()
                {
                    outcome.upgraded = num;
                }
                if let Some(n) = part.find(" newly installed")
                    && let Ok(num) = part[..n].trim().parse::<u32>()
                {
                    outcome.newly_installed = num;
                }
                if let Some(n) = part.find(" to remove")
                    && let Ok(num) = part[..n].trim().parse::<u32>()
                {
                    outcome.removed = num;
                }
            }
        }

        outcome
    }
}

#[async_trait]
impl OsAdapter for AptAdapter {
    fn family(&self) -> OsFamily {
        OsFamily::Debian
    }

    #[instrument(skip(self))]
    async fn package_manager_busy(&self) -> Result<bool, OsError> {
        let cmd = Cmd::new("pgrep")
            .arg("-x")
            .arg("apt|apt-get|dpkg|unattended-upgrade");

        let result = self
            .executor
            .run_with_timeout(&cmd.render(), PROBE_TIMEOUT)
            .await
            .map_err(|e| OsError::Execution(e.to_string()))?;

        match result.status {
            0 => Ok(true),
            1 => Ok(false),
            status => Err(OsError::ProbeFailed(format!(
                "pgrep exited {status}: {}",
                tail(&result.stderr, 200)
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn list_upgradable(&self) -> Result<Vec<UpgradablePackage>, OsError> {
        debug!("listing upgradable packages");

        self.refresh_metadata().await?;

        let cmd = Cmd::new("apt").args(["list", "--upgradable"]);
        let result = self
            .executor
            .run_with_timeout(&cmd.render(), PROBE_TIMEOUT)
            .await
            .map_err(|e| OsError::Execution(e.to_string()))?;

        if !result.success() {
            return Err(OsError::ProbeFailed(tail(&result.stderr, 500)));
        }

        let packages = Self::parse_upgradable(&result.stdout);
        info!(count = packages.len(), "found upgradable packages");

        Ok(packages)
    }

    #[instrument(skip(self))]
    async fn update_packages(&self) -> Result<UpdateOutcome, OsError> {
        info!("starting apt full-upgrade");

        self.refresh_metadata().await?;

        let cmd = Cmd::new("apt-get")
            .env("DEBIAN_FRONTEND", "noninteractive")
            .args(["full-upgrade", "-y"])
            .sudo_if(self.use_sudo);

        let result = self
            .executor
            .run_with_timeout(&cmd.render(), self.update_timeout)
            .await
            .map_err(|e| OsError::Execution(e.to_string()))?;

        if !result.success() {
            if result.stderr.contains("Could not get lock") {
                return Err(OsError::LockHeld(tail(&result.stderr, 500)));
            }
            return Err(OsError::UpdateFailed {
                status: result.status,
                detail: tail(&result.combined_output(), 500),
            });
        }

        let outcome = Self::parse_upgrade_summary(&result.combined_output());

        info!(
            upgraded = outcome.upgraded,
            newly_installed = outcome.newly_installed,
            removed = outcome.removed,
            "apt full-upgrade completed"
        );

        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn reboot_required(&self) -> Result<bool, OsError> {
        // Debian/Ubuntu drop a flag file when a restart is pending
        let cmd = Cmd::new("test").args(["-f", "/var/run/reboot-required"]);

        let result = self
            .executor
            .run_with_timeout(&cmd.render(), PROBE_TIMEOUT)
            .await
            .map_err(|e| OsError::Execution(e.to_string()))?;

        Ok(result.success())
    }
}

/// Last `max` bytes of command output, for error details
pub(crate) fn tail(output: &str, max: usize) -> String {
    let trimmed = output.trim();
    if trimmed.len() <= max {
        trimmed.to_string()
    } else {
        let start = trimmed.len() - max;
        // avoid splitting a UTF-8 sequence
        let start = (start..trimmed.len())
            .find(|i| trimmed.is_char_boundary(*i))
            .unwrap_or(start);
        trimmed[start..].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upgradable() {
        let output = r"Listing... Done
vim/now 2:8.2.2434-3+deb11u1 amd64 [upgradable from: 2:8.2.2434-3]
curl/stable 7.74.0-1.3+deb11u14 amd64 [upgradable from: 7.74.0-1.3+deb11u7]";

        let packages = AptAdapter::parse_upgradable(output);

        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "vim");
        assert_eq!(packages[0].new_version, "2:8.2.2434-3+deb11u1");
        assert_eq!(packages[0].current_version.as_deref(), Some("2:8.2.2434-3"));
    }

    #[test]
    fn test_parse_upgrade_summary() {
        let output = "5 upgraded, 2 newly installed, 1 to remove and 0 not upgraded.";

        let outcome = AptAdapter::parse_upgrade_summary(output);

        assert_eq!(outcome.upgraded, 5);
        assert_eq!(outcome.newly_installed, 2);
        assert_eq!(outcome.removed, 1);
    }

    #[test]
    fn test_tail_short_output_unchanged() {
        assert_eq!(tail("  short  ", 100), "short");
    }

    #[test]
    fn test_tail_truncates_long_output() {
        let long = "x".repeat(600);
        assert_eq!(tail(&long, 500).len(), 500);
    }
}
