//! DNF adapter (Fedora/RHEL/CentOS)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rollpatch_exec::command::Cmd;
use rollpatch_exec::traits::RemoteExecutor;
use tracing::{debug, info, instrument};

use crate::apt::tail;
use crate::error::OsError;
use crate::traits::OsAdapter;
use crate::types::{OsFamily, UpdateOutcome, UpgradablePackage};

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(1800);

/// DNF adapter for RHEL-like hosts
///
/// Falls back to `yum` on hosts that predate dnf.
pub struct DnfAdapter {
    executor: Arc<dyn RemoteExecutor>,
    use_sudo: bool,
    use_yum: bool,
    update_timeout: Duration,
}

impl DnfAdapter {
    /// Create a new DNF adapter
    pub fn new(executor: Arc<dyn RemoteExecutor>, use_sudo: bool) -> Self {
        Self {
            executor,
            use_sudo,
            use_yum: false,
            update_timeout: DEFAULT_UPDATE_TIMEOUT,
        }
    }

    /// Drive yum instead of dnf
    #[must_use]
    pub fn with_yum(mut self) -> Self {
        self.use_yum = true;
        self
    }

    /// Override the upgrade bound
    #[must_use]
    pub fn with_update_timeout(mut self, timeout: Duration) -> Self {
        self.update_timeout = timeout;
        self
    }

    fn tool(&self) -> &'static str {
        if self.use_yum { "yum" } else { "dnf" }
    }

    /// Parse `dnf check-update` output: `name.arch version repository`
    fn parse_upgradable(output: &str) -> Vec<UpgradablePackage> {
        let mut packages = Vec::new();

        for line in output.lines() {
            if line.is_empty()
                || line.starts_with("Last metadata")
                || line.starts_with("Obsoleting")
            {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                continue;
            }

            let name_arch = parts[0];
            let name = name_arch
                .rfind('.')
                .map_or(name_arch, |idx| &name_arch[..idx]);

            // check-update does not report the installed version
            packages.push(UpgradablePackage::new(name, parts[1]));
        }

        packages
    }

    /// Count upgraded/installed/removed packages from the transaction report
    fn parse_upgrade_report(output: &str) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();
        let mut section: Option<&str> = None;

        for line in output.lines() {
            let trimmed = line.trim_end();
            match trimmed {
                "Upgraded:" | "Updated:" => section = Some("upgraded"),
                "Installed:" => section = Some("installed"),
                "Removed:" => section = Some("removed"),
                "" => section = None,
                _ => {
                    if trimmed.starts_with(' ') {
                        match section {
                            Some("upgraded") => outcome.upgraded += 1,
                            Some("installed") => outcome.newly_installed += 1,
                            Some("removed") => outcome.removed += 1,
                            _ => {}
                        }
                    } else {
                        section = None;
                    }
                }
            }
        }

        outcome
    }
}

#[async_trait]
impl OsAdapter for DnfAdapter {
    fn family(&self) -> OsFamily {
        OsFamily::Rhel
    }

    #[instrument(skip(self))]
    async fn package_manager_busy(&self) -> Result<bool, OsError> {
        let cmd = Cmd::new("pgrep").arg("-x").arg("dnf|dnf5|yum");

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

        let cmd = Cmd::new(self.tool()).args(["check-update", "-q"]);
        let result = self
            .executor
            .run_with_timeout(&cmd.render(), self.update_timeout)
            .await
            .map_err(|e| OsError::Execution(e.to_string()))?;

        // check-update exits 100 when updates are available, 0 when none
        if result.status != 0 && result.status != 100 {
            return Err(OsError::ProbeFailed(tail(&result.stderr, 500)));
        }

        let packages = Self::parse_upgradable(&result.stdout);
        info!(count = packages.len(), "found upgradable packages");

        Ok(packages)
    }

    #[instrument(skip(self))]
    async fn update_packages(&self) -> Result<UpdateOutcome, OsError> {
        info!(tool = self.tool(), "starting full upgrade");

        let cmd = Cmd::new(self.tool())
            .args(["upgrade", "-y"])
            .sudo_if(self.use_sudo);

        let result = self
            .executor
            .run_with_timeout(&cmd.render(), self.update_timeout)
            .await
            .map_err(|e| OsError::Execution(e.to_string()))?;

        if !result.success() {
            if result.stderr.contains("lock") {
                return Err(OsError::LockHeld(tail(&result.stderr, 500)));
            }
            return Err(OsError::UpdateFailed {
                status: result.status,
                detail: tail(&result.combined_output(), 500),
            });
        }

        let outcome = Self::parse_upgrade_report(&result.stdout);

        info!(
            upgraded = outcome.upgraded,
            newly_installed = outcome.newly_installed,
            removed = outcome.removed,
            "upgrade completed"
        );

        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn reboot_required(&self) -> Result<bool, OsError> {
        let cmd = Cmd::new("needs-restarting").arg("-r");

        let result = self
            .executor
            .run_with_timeout(&cmd.render(), PROBE_TIMEOUT)
            .await
            .map_err(|e| OsError::Execution(e.to_string()))?;

        // exits 0 when no reboot is needed, 1 when one is
        match result.status {
            0 => Ok(false),
            1 => Ok(true),
            status => Err(OsError::ProbeFailed(format!(
                "needs-restarting exited {status}: {}",
                tail(&result.combined_output(), 200)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upgradable() {
        let output = r"Last metadata expiration check: 0:05:31 ago.
vim-enhanced.x86_64 2:8.2.2637-20.el9_1 baseos
curl.x86_64         7.76.1-26.el9_0 baseos";

        let packages = DnfAdapter::parse_upgradable(output);

        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "vim-enhanced");
        assert_eq!(packages[0].new_version, "2:8.2.2637-20.el9_1");
        assert!(packages[0].current_version.is_none());
    }

    #[test]
    fn test_parse_upgrade_report() {
        let output = "Upgraded:\n  vim-enhanced-2:8.2.2637-21.el9\n  curl-7.76.1-29.el9\n\nInstalled:\n  kernel-5.14.0-362.el9\n\nComplete!";

        let outcome = DnfAdapter::parse_upgrade_report(output);

        assert_eq!(outcome.upgraded, 2);
        assert_eq!(outcome.newly_installed, 1);
        assert_eq!(outcome.removed, 0);
    }
}
