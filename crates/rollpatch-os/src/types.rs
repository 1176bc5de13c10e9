//! Type definitions for OS adapters

use serde::{Deserialize, Serialize};

/// OS family, discovered once per host and cached for the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    /// Debian, Ubuntu and derivatives (apt)
    Debian,
    /// RHEL, CentOS, Fedora and derivatives (dnf/yum)
    Rhel,
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsFamily::Debian => write!(f, "debian"),
            OsFamily::Rhel => write!(f, "rhel"),
        }
    }
}

/// A package with an available upgrade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradablePackage {
    /// Package name
    pub name: String,
    /// Currently installed version, when the tool reports it
    pub current_version: Option<String>,
    /// Version the upgrade would install
    pub new_version: String,
}

impl UpgradablePackage {
    pub fn new(name: impl Into<String>, new_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current_version: None,
            new_version: new_version.into(),
        }
    }

    #[must_use]
    pub fn with_current(mut self, version: impl Into<String>) -> Self {
        self.current_version = Some(version.into());
        self
    }
}

/// Result of a completed package upgrade
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOutcome {
    /// Packages upgraded
    pub upgraded: u32,
    /// Packages newly installed
    pub newly_installed: u32,
    /// Packages removed
    pub removed: u32,
}
