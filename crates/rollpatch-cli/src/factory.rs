//! Production host component factory

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rollpatch_core::{CoreError, HostComponentFactory, HostSpec};
use rollpatch_exec::{ConnectionInfo, KeySource, LocalExecutor, RemoteExecutor, SshExecutor};
use rollpatch_k8s::NodeController;

use crate::settings::SshSettings;

/// Default implementation of `HostComponentFactory`: SSH executors built
/// from the fleet settings, local execution for localhost targets, and a
/// run-wide node controller.
pub struct DefaultHostFactory {
    ssh: SshSettings,
    node_controller: Arc<dyn NodeController>,
}

impl DefaultHostFactory {
    /// Create a new factory
    pub fn new(ssh: SshSettings, node_controller: Arc<dyn NodeController>) -> Self {
        Self {
            ssh,
            node_controller,
        }
    }

    fn build_executor(&self, spec: &HostSpec) -> Result<Arc<dyn RemoteExecutor>, CoreError> {
        // Localhost targets skip SSH entirely
        if spec.addr == "localhost" || spec.addr == "127.0.0.1" {
            return Ok(Arc::new(LocalExecutor::new()));
        }

        let key_source = if let Some(path) = spec.ssh_key.as_ref() {
            KeySource::Path(path.into())
        } else if let Some(var) = self.ssh.key_env.as_ref() {
            KeySource::Env(var.clone())
        } else {
            KeySource::Agent
        };

        let conn_info = ConnectionInfo::new(&spec.addr, &spec.user)
            .with_port(spec.port)
            .with_connect_timeout(Duration::from_secs(self.ssh.connect_timeout_secs));

        let executor = SshExecutor::new(conn_info, &key_source)
            .map_err(|e| CoreError::Config(format!("ssh setup for {}: {e}", spec.name)))?;

        Ok(Arc::new(executor))
    }
}

#[async_trait]
impl HostComponentFactory for DefaultHostFactory {
    async fn create_executor(
        &self,
        spec: &HostSpec,
    ) -> Result<Arc<dyn RemoteExecutor>, CoreError> {
        self.build_executor(spec)
    }

    fn node_controller(&self) -> Arc<dyn NodeController> {
        self.node_controller.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollpatch_k8s::NoClusterController;

    #[test]
    fn test_localhost_executor_creation() {
        let factory = DefaultHostFactory::new(SshSettings::default(), Arc::new(NoClusterController));

        let mut spec = HostSpec::named("local");
        spec.addr = "127.0.0.1".to_string();

        let executor = factory.build_executor(&spec);
        assert!(executor.is_ok());
        assert_eq!(executor.unwrap().executor_type(), "local");
    }
}
