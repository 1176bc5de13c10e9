//! Inventory type definitions and resolution

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::InventoryError;

/// A host known to the inventory, with optional connection overrides.
/// Everything beyond the name falls back to fleet-wide defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    /// Hostname identifier, unique within the inventory
    pub name: String,
    /// Connection address when it differs from the name
    #[serde(default)]
    pub addr: Option<String>,
    /// SSH user override
    #[serde(default)]
    pub user: Option<String>,
    /// SSH port override
    #[serde(default)]
    pub port: Option<u16>,
    /// SSH key path override
    #[serde(default)]
    pub ssh_key: Option<String>,
    /// Cluster node name when it differs from the hostname
    #[serde(default)]
    pub node_name: Option<String>,
}

impl HostEntry {
    /// Entry with just a name, everything else defaulted
    #[must_use]
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: None,
            user: None,
            port: None,
            ssh_key: None,
            node_name: None,
        }
    }
}

/// A named, ordered group of hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupEntry {
    /// Group name
    pub name: String,
    /// Member hostnames, in patch order
    pub hosts: Vec<String>,
}

/// The fleet inventory: groups plus per-host entries.
///
/// Declared as arrays of tables so group and member order survive
/// deserialization; resolution order is declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    /// Host groups
    #[serde(default, rename = "group")]
    pub groups: Vec<GroupEntry>,
    /// Per-host entries (connection overrides; membership comes from groups)
    #[serde(default, rename = "host")]
    pub hosts: Vec<HostEntry>,
}

impl Inventory {
    /// Load an inventory from a TOML file
    ///
    /// # Errors
    /// `FileNotFound` when the path is unreadable, `Parse` on bad TOML
    pub fn load(path: &Path) -> Result<Self, InventoryError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| InventoryError::FileNotFound(format!("{}: {e}", path.display())))?;
        let inventory: Inventory =
            toml::from_str(&content).map_err(|e| InventoryError::Parse(e.to_string()))?;

        debug!(
            path = %path.display(),
            groups = inventory.groups.len(),
            hosts = inventory.hosts.len(),
            "loaded inventory"
        );

        Ok(inventory)
    }

    /// Resolve a single explicit target. The host does not have to appear
    /// in the inventory; unknown names become bare entries.
    pub fn resolve_host(&self, name: &str) -> Vec<HostEntry> {
        vec![self.entry_for(name)]
    }

    /// Resolve a named group in its declared member order
    ///
    /// # Errors
    /// `NoHostsResolved` when the group is missing or empty
    pub fn resolve_group(&self, name: &str) -> Result<Vec<HostEntry>, InventoryError> {
        let group = self
            .groups
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| {
                InventoryError::NoHostsResolved(format!("group '{name}' is not defined"))
            })?;

        let resolved = dedup(group.hosts.iter().map(|h| self.entry_for(h)));
        if resolved.is_empty() {
            return Err(InventoryError::NoHostsResolved(format!(
                "group '{name}' has no members"
            )));
        }

        Ok(resolved)
    }

    /// Resolve every inventory host: group members in group order, then
    /// standalone host entries that no group mentions
    ///
    /// # Errors
    /// `NoHostsResolved` when the inventory is empty
    pub fn resolve_all(&self) -> Result<Vec<HostEntry>, InventoryError> {
        let grouped = self
            .groups
            .iter()
            .flat_map(|g| g.hosts.iter())
            .map(|h| self.entry_for(h));
        let standalone = self.hosts.iter().cloned();

        let resolved = dedup(grouped.chain(standalone));
        if resolved.is_empty() {
            return Err(InventoryError::NoHostsResolved(
                "inventory defines no hosts".to_string(),
            ));
        }

        Ok(resolved)
    }

    /// The configured entry for a hostname, or a bare default
    fn entry_for(&self, name: &str) -> HostEntry {
        self.hosts
            .iter()
            .find(|h| h.name == name)
            .cloned()
            .unwrap_or_else(|| HostEntry::bare(name))
    }
}

/// Keep first occurrence of each hostname, preserving order
fn dedup(entries: impl Iterator<Item = HostEntry>) -> Vec<HostEntry> {
    let mut seen = HashSet::new();
    entries
        .filter(|e| seen.insert(e.name.clone()))
        .collect()
}
