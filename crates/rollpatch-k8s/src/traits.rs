//! Node controller trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::K8sError;

/// Cluster operations the patch pipeline performs on a node.
///
/// Implementations are keyed by node name; hostname-to-node resolution is
/// part of the interface because the two frequently differ.
#[async_trait]
pub trait NodeController: Send + Sync {
    /// Map a hostname to its cluster node name. `Ok(None)` means the host
    /// is not a cluster member.
    async fn resolve_node(&self, host: &str) -> Result<Option<String>, K8sError>;

    /// Cordon the node and evict its workloads, bounded by `timeout`.
    /// Daemonset-managed and mirror pods stay put.
    async fn drain(&self, node: &str, timeout: Duration) -> Result<(), K8sError>;

    /// Mark the node schedulable again
    async fn uncordon(&self, node: &str) -> Result<(), K8sError>;

    /// Poll the Ready condition every `poll` until true or `timeout`
    async fn wait_ready(&self, node: &str, timeout: Duration, poll: Duration)
    -> Result<(), K8sError>;
}

/// Controller used when there is no cluster access: every host resolves
/// as a non-member, so drain/uncordon/wait are never reached.
#[derive(Debug, Clone, Default)]
pub struct NoClusterController;

#[async_trait]
impl NodeController for NoClusterController {
    async fn resolve_node(&self, _host: &str) -> Result<Option<String>, K8sError> {
        Ok(None)
    }

    async fn drain(&self, node: &str, _timeout: Duration) -> Result<(), K8sError> {
        Err(K8sError::Config(format!(
            "no cluster access, cannot drain {node}"
        )))
    }

    async fn uncordon(&self, node: &str) -> Result<(), K8sError> {
        Err(K8sError::Config(format!(
            "no cluster access, cannot uncordon {node}"
        )))
    }

    async fn wait_ready(
        &self,
        node: &str,
        _timeout: Duration,
        _poll: Duration,
    ) -> Result<(), K8sError> {
        Err(K8sError::Config(format!(
            "no cluster access, cannot watch {node}"
        )))
    }
}
