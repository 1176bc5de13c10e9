//! SSH key resolution

use std::env;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ExecError;

/// Where the SSH private key comes from
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Explicit path to a key file
    Path(PathBuf),
    /// Use the SSH agent
    Agent,
    /// Base64-encoded key material in an environment variable
    Env(String),
}

impl KeySource {
    /// Resolve to a usable key location.
    ///
    /// `Env` keys are decoded and written to a mode-600 temp file that is
    /// removed when the resolved key is dropped.
    ///
    /// # Errors
    /// Returns `ExecError::SshKeyError` when the file is missing, has
    /// group/other permission bits set, or the env material is invalid.
    pub fn resolve(&self) -> Result<ResolvedKey, ExecError> {
        match self {
            KeySource::Path(path) => {
                check_permissions(path)?;
                Ok(ResolvedKey::Path(path.clone()))
            }
            KeySource::Agent => Ok(ResolvedKey::Agent),
            KeySource::Env(var) => {
                let encoded = env::var(var).map_err(|_| {
                    ExecError::SshKeyError(format!("environment variable {var} not set"))
                })?;
                let material = decode_base64(&encoded)
                    .map_err(|_| ExecError::SshKeyError("invalid base64 encoding".to_string()))?;
                let path = write_temp_key(&material)
                    .map_err(|e| ExecError::SshKeyError(e.to_string()))?;
                Ok(ResolvedKey::Temp(path))
            }
        }
    }
}

/// A resolved key location
#[derive(Debug)]
pub enum ResolvedKey {
    Path(PathBuf),
    Agent,
    /// Temporary file, removed on drop
    Temp(PathBuf),
}

impl ResolvedKey {
    /// File path to hand to the SSH library, if any
    #[must_use]
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ResolvedKey::Path(p) | ResolvedKey::Temp(p) => Some(p),
            ResolvedKey::Agent => None,
        }
    }

    /// Whether authentication goes through the SSH agent
    #[must_use]
    pub fn use_agent(&self) -> bool {
        matches!(self, ResolvedKey::Agent)
    }
}

impl Drop for ResolvedKey {
    fn drop(&mut self) {
        if let ResolvedKey::Temp(path) = self
            && let Err(e) = std::fs::remove_file(&path)
        {
            warn!(path = %path.display(), error = %e, "failed to remove temp key");
        }
    }
}

fn decode_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(input.trim())
}

fn check_permissions(path: &Path) -> Result<(), ExecError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)
        .map_err(|e| ExecError::SshKeyError(format!("{}: {e}", path.display())))?;

    // group/other bits must be clear (600 or stricter)
    if metadata.permissions().mode() & 0o77 != 0 {
        return Err(ExecError::SshKeyError(format!(
            "key file permissions too open: {} (should be 600)",
            path.display()
        )));
    }

    Ok(())
}

fn write_temp_key(material: &[u8]) -> std::io::Result<PathBuf> {
    use std::fs::File;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = std::env::temp_dir().join(format!("rollpatch_ssh_key_{}", std::process::id()));

    let mut file = File::create(&path)?;
    file.write_all(material)?;

    let mut permissions = file.metadata()?.permissions();
    permissions.set_mode(0o600);
    std::fs::set_permissions(&path, permissions)?;

    debug!(path = %path.display(), "wrote temporary SSH key");

    Ok(path)
}
