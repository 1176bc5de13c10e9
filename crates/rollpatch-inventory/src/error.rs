//! Error types for rollpatch-inventory

use thiserror::Error;

/// Errors that can occur while loading or resolving the inventory
#[derive(Error, Debug, Clone)]
pub enum InventoryError {
    /// Target selection produced an empty host list
    #[error("no hosts resolved: {0}")]
    NoHostsResolved(String),

    /// Inventory file missing or unreadable
    #[error("inventory file not found: {0}")]
    FileNotFound(String),

    /// Inventory file did not parse
    #[error("inventory parse error: {0}")]
    Parse(String),
}
