//! OS adapter trait

use async_trait::async_trait;

use crate::error::OsError;
use crate::types::{OsFamily, UpdateOutcome, UpgradablePackage};

/// Per-family OS operations used by the patch pipeline.
///
/// `reboot_required` is a trait method rather than a shared marker check
/// because the detection mechanism genuinely differs per family and may
/// need to be environment-specific; swapping an adapter swaps the
/// predicate with it.
#[async_trait]
pub trait OsAdapter: Send + Sync {
    /// Family this adapter drives
    fn family(&self) -> OsFamily;

    /// Whether another process currently holds the package manager lock
    async fn package_manager_busy(&self) -> Result<bool, OsError>;

    /// Packages an upgrade would touch (read-only preview)
    async fn list_upgradable(&self) -> Result<Vec<UpgradablePackage>, OsError>;

    /// Non-interactive full upgrade; a non-zero remote exit status is
    /// surfaced as `OsError::UpdateFailed`
    async fn update_packages(&self) -> Result<UpdateOutcome, OsError>;

    /// Whether the OS reports a pending reboot
    async fn reboot_required(&self) -> Result<bool, OsError>;
}
