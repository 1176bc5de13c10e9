//! OS family detection

use std::sync::Arc;

use rollpatch_exec::traits::RemoteExecutor;
use tracing::{debug, info};

use crate::apt::AptAdapter;
use crate::dnf::DnfAdapter;
use crate::error::OsError;
use crate::traits::OsAdapter;
use crate::types::OsFamily;

/// Detect the OS family of a host.
///
/// Reads `/etc/os-release` first; falls back to probing for the package
/// manager binary when the file is missing or inconclusive.
///
/// # Errors
/// Returns `OsError::UnsupportedOs` when neither path identifies a
/// supported family.
pub async fn detect_family(executor: &dyn RemoteExecutor) -> Result<OsFamily, OsError> {
    let release = executor
        .run("cat /etc/os-release")
        .await
        .map_err(|e| OsError::Execution(e.to_string()))?;

    if release.success()
        && let Some(family) = parse_os_release(&release.stdout)
    {
        debug!(family = %family, "os family from os-release");
        return Ok(family);
    }

    // Older images without os-release: probe for the package manager
    let apt = executor
        .run("command -v apt-get")
        .await
        .map_err(|e| OsError::Execution(e.to_string()))?;
    if apt.success() {
        info!("os family from apt-get probe");
        return Ok(OsFamily::Debian);
    }

    let dnf = executor
        .run("command -v dnf || command -v yum")
        .await
        .map_err(|e| OsError::Execution(e.to_string()))?;
    if dnf.success() {
        info!("os family from dnf/yum probe");
        return Ok(OsFamily::Rhel);
    }

    Err(OsError::UnsupportedOs(
        "no supported package manager found (tried apt-get, dnf, yum)".to_string(),
    ))
}

/// Build the adapter for a detected family
#[must_use]
pub fn adapter_for(
    family: OsFamily,
    executor: Arc<dyn RemoteExecutor>,
    use_sudo: bool,
    update_timeout: std::time::Duration,
) -> Arc<dyn OsAdapter> {
    match family {
        OsFamily::Debian => Arc::new(
            AptAdapter::new(executor, use_sudo).with_update_timeout(update_timeout),
        ),
        OsFamily::Rhel => Arc::new(
            DnfAdapter::new(executor, use_sudo).with_update_timeout(update_timeout),
        ),
    }
}

/// Map os-release ID / ID_LIKE values to a family
fn parse_os_release(content: &str) -> Option<OsFamily> {
    let mut id = None;
    let mut id_like = None;

    for line in content.lines() {
        if let Some(value) = line.strip_prefix("ID=") {
            id = Some(value.trim_matches('"').to_ascii_lowercase());
        } else if let Some(value) = line.strip_prefix("ID_LIKE=") {
            id_like = Some(value.trim_matches('"').to_ascii_lowercase());
        }
    }

    let haystack = format!(
        "{} {}",
        id.unwrap_or_default(),
        id_like.unwrap_or_default()
    );

    for token in haystack.split_whitespace() {
        match token {
            "debian" | "ubuntu" | "raspbian" => return Some(OsFamily::Debian),
            "rhel" | "centos" | "fedora" | "rocky" | "almalinux" | "ol" => {
                return Some(OsFamily::Rhel);
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_debian() {
        let content = "PRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"\nID=debian\n";
        assert_eq!(parse_os_release(content), Some(OsFamily::Debian));
    }

    #[test]
    fn test_parse_ubuntu_via_id_like() {
        let content = "ID=neon\nID_LIKE=\"ubuntu debian\"\n";
        assert_eq!(parse_os_release(content), Some(OsFamily::Debian));
    }

    #[test]
    fn test_parse_rocky_via_id_like() {
        let content = "ID=\"rocky\"\nID_LIKE=\"rhel centos fedora\"\n";
        assert_eq!(parse_os_release(content), Some(OsFamily::Rhel));
    }

    #[test]
    fn test_parse_unknown() {
        let content = "ID=alpine\n";
        assert_eq!(parse_os_release(content), None);
    }
}
