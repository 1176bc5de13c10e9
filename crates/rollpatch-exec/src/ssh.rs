//! SSH command execution using russh crate

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::keys::ssh_key;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key};
use russh::{ChannelMsg, Disconnect, client};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ExecError;
use crate::keys::{KeySource, ResolvedKey};
use crate::result::{CommandResult, ConnectionInfo};
use crate::traits::RemoteExecutor;

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no).
        // Host keys churn across reinstalls in the fleets this targets;
        // known_hosts verification would need operator-managed state.
        Ok(true)
    }
}

/// SSH command executor
///
/// Batch-mode only: public-key authentication, no password prompts. The
/// session is established on first use and re-established transparently
/// after a failure, which is what lets reachability polling ride through
/// a host reboot.
pub struct SshExecutor {
    /// Connection configuration
    conn_info: ConnectionInfo,
    /// Resolved SSH key
    key: ResolvedKey,
    /// SSH session (initialized on first use)
    session: Mutex<Option<client::Handle<SshClientHandler>>>,
}

impl std::fmt::Debug for SshExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshExecutor")
            .field("conn_info", &self.conn_info)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl SshExecutor {
    /// Create a new SSH executor
    ///
    /// # Errors
    /// Returns `ExecError::SshKeyError` if key resolution fails
    pub fn new(conn_info: ConnectionInfo, key_source: &KeySource) -> Result<Self, ExecError> {
        let key = key_source.resolve()?;

        Ok(Self {
            conn_info,
            key,
            session: Mutex::new(None),
        })
    }

    /// Get connection info
    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.conn_info
    }

    /// Connect to the remote host, bounded by the configured connect timeout
    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn connect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if session_lock.is_some() {
            return Ok(());
        }

        debug!(
            host = %self.conn_info.host,
            port = self.conn_info.port,
            user = %self.conn_info.user,
            "connecting to SSH"
        );

        let config = Arc::new(client::Config::default());
        let handler = SshClientHandler;

        let connect_fut = client::connect(
            config,
            (&self.conn_info.host[..], self.conn_info.port),
            handler,
        );

        let mut session = match timeout(self.conn_info.connect_timeout, connect_fut).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(ExecError::ConnectionFailed(e.to_string())),
            Err(_) => {
                return Err(ExecError::ConnectionFailed(format!(
                    "connect timed out after {:?}",
                    self.conn_info.connect_timeout
                )));
            }
        };

        if self.key.use_agent() {
            // russh agent auth needs a pageant-style identity round-trip
            // that is not wired up; require an explicit key path instead
            return Err(ExecError::AuthenticationFailed(
                "SSH agent authentication not supported; configure an ssh key path".to_string(),
            ));
        }

        let Some(key_path) = self.key.path() else {
            return Err(ExecError::AuthenticationFailed(
                "no authentication method available".to_string(),
            ));
        };

        let key_pair =
            load_secret_key(key_path, None).map_err(|e| ExecError::SshKeyError(e.to_string()))?;

        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        let auth_res = session
            .authenticate_publickey(
                &self.conn_info.user,
                PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg),
            )
            .await
            .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;

        if !auth_res.success() {
            return Err(ExecError::AuthenticationFailed(
                "public key authentication failed".to_string(),
            ));
        }

        info!(host = %self.conn_info.host, "SSH connected and authenticated");

        *session_lock = Some(session);
        Ok(())
    }

    /// Execute command on the established session
    #[instrument(skip(self, cmd), fields(host = %self.conn_info.host))]
    async fn execute_remote(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let mut session_lock = self.session.lock().await;

        let session = session_lock.as_mut().ok_or(ExecError::NotConnected)?;

        debug!(command = %cmd, "executing remote command");

        let start = Instant::now();

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let mut status = -1;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        loop {
            let msg = channel.wait().await;

            match msg {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        // stderr
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    status = exit_status.cast_signed();
                }
                Some(ChannelMsg::Eof) | None => break,
                _ => {}
            }
        }

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&stdout).to_string();
        let stderr = String::from_utf8_lossy(&stderr).to_string();

        debug!(
            command = %cmd,
            status = status,
            duration = ?duration,
            "remote command completed"
        );

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }

    /// Drop the cached session so the next call reconnects
    async fn invalidate_session(&self) {
        let mut session_lock = self.session.lock().await;
        if session_lock.take().is_some() {
            warn!(host = %self.conn_info.host, "dropping SSH session after failure");
        }
    }

    /// Disconnect from remote host
    ///
    /// # Errors
    /// Returns `ExecError::IoError` if disconnection fails
    pub async fn disconnect(&self) -> Result<(), ExecError> {
        let mut session_lock = self.session.lock().await;

        if let Some(session) = session_lock.take() {
            session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            info!(host = %self.conn_info.host, "SSH disconnected");
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.connect().await?;

        match self.execute_remote(cmd).await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.invalidate_session().await;
                Err(e)
            }
        }
    }

    #[instrument(skip(self), fields(host = %self.conn_info.host))]
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        self.connect().await?;

        let result = timeout(timeout_duration, self.execute_remote(cmd)).await;

        match result {
            Ok(Ok(cmd_result)) => Ok(cmd_result),
            Ok(Err(e)) => {
                self.invalidate_session().await;
                Err(e)
            }
            Err(_) => {
                error!(
                    command = %cmd,
                    timeout = ?timeout_duration,
                    elapsed = ?start.elapsed(),
                    "command timed out"
                );
                self.invalidate_session().await;
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }

    fn executor_type(&self) -> &'static str {
        "ssh"
    }
}

#[cfg(test)]
mod tests {
    // These tests require an SSH server - marked as ignored
    #[tokio::test]
    #[ignore = "requires SSH server"]
    async fn test_ssh_connection() {
        // Placeholder for tests against a disposable sshd container
    }
}
