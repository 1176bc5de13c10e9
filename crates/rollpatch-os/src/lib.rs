//! rollpatch-os: OS family adapters
//!
//! Per-family capability set used by the patch pipeline: package-manager
//! busy detection, non-interactive full upgrade, and reboot-required
//! probing, for Debian-like (apt) and RHEL-like (dnf/yum) systems.

pub mod apt;
pub mod detect;
pub mod dnf;
pub mod error;
pub mod traits;
pub mod types;

pub use apt::AptAdapter;
pub use detect::{adapter_for, detect_family};
pub use dnf::DnfAdapter;
pub use error::OsError;
pub use traits::OsAdapter;
pub use types::{OsFamily, UpdateOutcome, UpgradablePackage};
