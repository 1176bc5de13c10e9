//! Remote executor trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::CommandResult;

/// Executes commands on a target host.
///
/// Implementations return `Ok(CommandResult)` for any command that ran to
/// completion, including commands that exited non-zero; callers inspect
/// the exit status themselves. Errors are reserved for transport problems
/// (connect, auth, spawn, timeout).
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    fn executor_type(&self) -> &'static str;
}
