//! Kubernetes node controller backed by the cluster API

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, EvictParams, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

use crate::error::K8sError;
use crate::traits::NodeController;

/// Delay between eviction sweeps while draining
const EVICTION_POLL: Duration = Duration::from_secs(5);

/// Node controller talking to the cluster API
///
/// Drain is cordon + eviction-API sweeps over the node's pods, the same
/// shape kubectl drain has with `--ignore-daemonsets` and emptyDir
/// deletion permitted.
pub struct KubeNodeController {
    client: Client,
}

impl KubeNodeController {
    /// Connect using kubeconfig / in-cluster environment
    ///
    /// # Errors
    /// Returns `K8sError::Config` when no client configuration is usable
    pub async fn connect() -> Result<Self, K8sError> {
        let client = Client::try_default()
            .await
            .map_err(|e| K8sError::Config(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    /// Evictable pods currently scheduled on the node
    async fn pods_on_node(&self, node: &str) -> Result<Vec<Pod>, K8sError> {
        let params = ListParams::default().fields(&format!("spec.nodeName={node}"));
        let pods = Api::<Pod>::all(self.client.clone())
            .list(&params)
            .await
            .map_err(|e| K8sError::Api(e.to_string()))?;

        Ok(pods.items.into_iter().filter(|p| !skip_pod(p)).collect())
    }

    async fn set_unschedulable(&self, node: &str, value: bool) -> Result<(), K8sError> {
        let patch = serde_json::json!({ "spec": { "unschedulable": value } });
        self.nodes()
            .patch(node, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| K8sError::Api(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl NodeController for KubeNodeController {
    #[instrument(skip(self))]
    async fn resolve_node(&self, host: &str) -> Result<Option<String>, K8sError> {
        let nodes = self
            .nodes()
            .list(&ListParams::default())
            .await
            .map_err(|e| K8sError::Api(e.to_string()))?;

        for node in nodes.items {
            let name = node.name_any();
            if node_matches(&name, node_addresses(&node), host) {
                debug!(host, node = %name, "resolved cluster node");
                return Ok(Some(name));
            }
        }

        debug!(host, "host is not a cluster member");
        Ok(None)
    }

    #[instrument(skip(self))]
    async fn drain(&self, node: &str, timeout: Duration) -> Result<(), K8sError> {
        let deadline = Instant::now() + timeout;

        self.set_unschedulable(node, true).await?;
        info!(node, "cordoned");

        loop {
            let pods = self.pods_on_node(node).await?;
            if pods.is_empty() {
                info!(node, "drain complete");
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(K8sError::DrainTimeout {
                    node: node.to_string(),
                    timeout,
                    remaining: pods.len(),
                });
            }

            for pod in &pods {
                let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
                let name = pod.name_any();
                let api = Api::<Pod>::namespaced(self.client.clone(), &namespace);

                match api.evict(&name, &EvictParams::default()).await {
                    Ok(_) => debug!(node, namespace = %namespace, pod = %name, "evicted"),
                    Err(kube::Error::Api(ae)) if ae.code == 429 => {
                        // Disruption budget exhausted; retry until the
                        // drain deadline
                        debug!(node, pod = %name, "eviction blocked by disruption budget");
                    }
                    Err(kube::Error::Api(ae)) if ae.code == 404 => {}
                    Err(e) => return Err(K8sError::Api(e.to_string())),
                }
            }

            sleep(EVICTION_POLL).await;
        }
    }

    #[instrument(skip(self))]
    async fn uncordon(&self, node: &str) -> Result<(), K8sError> {
        self.set_unschedulable(node, false).await?;
        info!(node, "uncordoned");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn wait_ready(
        &self,
        node: &str,
        timeout: Duration,
        poll: Duration,
    ) -> Result<(), K8sError> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.nodes().get_opt(node).await {
                Ok(Some(n)) if is_ready(&n) => {
                    info!(node, "node is ready");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => warn!(node, error = %e, "node status read failed"),
            }

            if Instant::now() >= deadline {
                return Err(K8sError::NotReady {
                    node: node.to_string(),
                    timeout,
                });
            }

            sleep(poll).await;
        }
    }
}

/// Pods a drain leaves in place: daemonset-managed, mirror (static) pods,
/// and pods already in a terminal phase
fn skip_pod(pod: &Pod) -> bool {
    let metadata = &pod.metadata;

    if let Some(annotations) = &metadata.annotations
        && annotations.contains_key("kubernetes.io/config.mirror")
    {
        return true;
    }

    if let Some(owners) = &metadata.owner_references
        && owners.iter().any(|o| o.kind == "DaemonSet")
    {
        return true;
    }

    matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded" | "Failed")
    )
}

/// Whether the node reports `Ready=True`
fn is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

fn node_addresses(node: &Node) -> Vec<String> {
    node.status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .map(|addrs| addrs.iter().map(|a| a.address.clone()).collect())
        .unwrap_or_default()
}

/// Match a hostname against a node: exact name, shared short name, or any
/// reported node address
fn node_matches(node_name: &str, addresses: Vec<String>, host: &str) -> bool {
    if node_name == host {
        return true;
    }

    let host_short = host.split('.').next().unwrap_or(host);
    let node_short = node_name.split('.').next().unwrap_or(node_name);
    if host_short == node_short {
        return true;
    }

    addresses.iter().any(|a| a == host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use std::collections::BTreeMap;

    fn node_with_condition(type_: &str, status: &str) -> Node {
        Node {
            status: Some(NodeStatus {
                conditions: Some(vec![NodeCondition {
                    type_: type_.to_string(),
                    status: status.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_ready_node() {
        assert!(is_ready(&node_with_condition("Ready", "True")));
    }

    #[test]
    fn test_not_ready_node() {
        assert!(!is_ready(&node_with_condition("Ready", "False")));
        assert!(!is_ready(&node_with_condition("MemoryPressure", "True")));
        assert!(!is_ready(&Node::default()));
    }

    #[test]
    fn test_skip_daemonset_pod() {
        let mut pod = Pod::default();
        pod.metadata.owner_references = Some(vec![OwnerReference {
            kind: "DaemonSet".to_string(),
            ..Default::default()
        }]);
        assert!(skip_pod(&pod));
    }

    #[test]
    fn test_skip_mirror_pod() {
        let mut pod = Pod::default();
        let mut annotations = BTreeMap::new();
        annotations.insert(
            "kubernetes.io/config.mirror".to_string(),
            "abc123".to_string(),
        );
        pod.metadata.annotations = Some(annotations);
        assert!(skip_pod(&pod));
    }

    #[test]
    fn test_skip_completed_pod() {
        let mut pod = Pod::default();
        pod.status = Some(PodStatus {
            phase: Some("Succeeded".to_string()),
            ..Default::default()
        });
        assert!(skip_pod(&pod));
    }

    #[test]
    fn test_ordinary_pod_is_evictable() {
        let mut pod = Pod::default();
        pod.metadata.owner_references = Some(vec![OwnerReference {
            kind: "ReplicaSet".to_string(),
            ..Default::default()
        }]);
        assert!(!skip_pod(&pod));
    }

    #[test]
    fn test_node_matches_exact_and_short() {
        assert!(node_matches("web01", vec![], "web01"));
        assert!(node_matches("web01.cluster.local", vec![], "web01"));
        assert!(node_matches("web01", vec![], "web01.example.com"));
        assert!(!node_matches("web02", vec![], "web01"));
    }

    #[test]
    fn test_node_matches_address() {
        assert!(node_matches(
            "node-a",
            vec!["10.0.0.5".to_string()],
            "10.0.0.5"
        ));
    }
}
