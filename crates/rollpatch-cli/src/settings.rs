//! Settings loading
//!
//! One TOML file carries the SSH defaults, timeout overrides, and the
//! inventory itself. Discovery order: explicit `--config`, the
//! `ROLLING_PATCH_CONFIG` env var, then the usual locations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rollpatch_core::{HostSpec, Timeouts};
use rollpatch_inventory::{HostEntry, Inventory};
use serde::Deserialize;

/// Top-level settings for a patch run
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Fleet-wide SSH defaults
    #[serde(default)]
    pub ssh: SshSettings,
    /// Timeout overrides, in seconds
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    /// Groups and host entries
    #[serde(flatten)]
    pub inventory: Inventory,
}

/// SSH connection defaults, overridable per host in the inventory
#[derive(Debug, Clone, Deserialize)]
pub struct SshSettings {
    /// User to connect as
    #[serde(default = "default_user")]
    pub user: String,
    /// Port to connect to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Private key path; agent auth is not supported, so most setups set this
    #[serde(default)]
    pub key: Option<String>,
    /// Environment variable holding a base64-encoded key (CI runs)
    #[serde(default)]
    pub key_env: Option<String>,
    /// Connect + reachability probe bound
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: default_user(),
            port: default_port(),
            key: None,
            key_env: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Optional timeout overrides; unset fields keep the built-in defaults
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeoutSettings {
    pub update_secs: Option<u64>,
    pub drain_secs: Option<u64>,
    pub reboot_grace_secs: Option<u64>,
    pub reboot_total_secs: Option<u64>,
    pub reboot_poll_secs: Option<u64>,
    pub ready_total_secs: Option<u64>,
    pub ready_poll_secs: Option<u64>,
}

impl Settings {
    /// Load settings from an explicit path
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load_file(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("cannot read {}: {e}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("cannot parse {}: {e}", path.display()))?;
        Ok(settings)
    }

    /// Load from the explicit path, env var, or default locations
    pub fn load(explicit: Option<&Path>) -> eyre::Result<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        if let Ok(path) = std::env::var("ROLLING_PATCH_CONFIG") {
            return Self::load_file(&PathBuf::from(path));
        }

        let candidates = [
            PathBuf::from("rolling-patch.toml"),
            PathBuf::from("/etc/rolling-patch/rolling-patch.toml"),
            dirs::config_dir()
                .map(|p| p.join("rolling-patch/rolling-patch.toml"))
                .unwrap_or_default(),
        ];

        for path in candidates {
            if path.exists() {
                return Self::load_file(&path);
            }
        }

        tracing::warn!("no settings file found, using defaults");
        Ok(Settings::default())
    }

    /// Stage timeouts with overrides applied
    #[must_use]
    pub fn timeouts(&self) -> Timeouts {
        let mut timeouts = Timeouts::default();
        timeouts.connect = Duration::from_secs(self.ssh.connect_timeout_secs);

        let overrides = [
            (&mut timeouts.update, self.timeouts.update_secs),
            (&mut timeouts.drain, self.timeouts.drain_secs),
            (&mut timeouts.reboot_grace, self.timeouts.reboot_grace_secs),
            (&mut timeouts.reboot_total, self.timeouts.reboot_total_secs),
            (&mut timeouts.reboot_poll, self.timeouts.reboot_poll_secs),
            (&mut timeouts.ready_total, self.timeouts.ready_total_secs),
            (&mut timeouts.ready_poll, self.timeouts.ready_poll_secs),
        ];
        for (slot, secs) in overrides {
            if let Some(secs) = secs {
                *slot = Duration::from_secs(secs);
            }
        }

        timeouts
    }

    /// Combine an inventory entry with the fleet defaults
    #[must_use]
    pub fn host_spec(&self, entry: &HostEntry) -> HostSpec {
        HostSpec {
            name: entry.name.clone(),
            addr: entry.addr.clone().unwrap_or_else(|| entry.name.clone()),
            user: entry.user.clone().unwrap_or_else(|| self.ssh.user.clone()),
            port: entry.port.unwrap_or(self.ssh.port),
            ssh_key: entry.ssh_key.clone().or_else(|| self.ssh.key.clone()),
            node_name: entry.node_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.ssh.user, "root");
        assert_eq!(settings.ssh.port, 22);

        let timeouts = settings.timeouts();
        assert_eq!(timeouts.connect, Duration::from_secs(10));
        assert_eq!(timeouts.drain, Duration::from_secs(300));
    }

    #[test]
    fn test_parse_with_inventory_and_overrides() {
        let settings: Settings = toml::from_str(
            r#"
            [ssh]
            user = "patchops"
            key = "/etc/rolling-patch/id_ed25519"

            [timeouts]
            drain_secs = 600

            [[group]]
            name = "web"
            hosts = ["web01"]

            [[host]]
            name = "web01"
            addr = "10.1.0.1"
            "#,
        )
        .unwrap();

        assert_eq!(settings.ssh.user, "patchops");
        assert_eq!(settings.timeouts().drain, Duration::from_secs(600));

        let entries = settings.inventory.resolve_group("web").unwrap();
        let spec = settings.host_spec(&entries[0]);
        assert_eq!(spec.addr, "10.1.0.1");
        assert_eq!(spec.user, "patchops");
        assert_eq!(
            spec.ssh_key.as_deref(),
            Some("/etc/rolling-patch/id_ed25519")
        );
    }
}
