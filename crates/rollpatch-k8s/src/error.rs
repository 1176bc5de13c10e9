//! Error types for rollpatch-k8s

use std::time::Duration;

use thiserror::Error;

/// Errors from cluster node operations
#[derive(Error, Debug, Clone)]
pub enum K8sError {
    /// No usable kubeconfig / in-cluster config
    #[error("cluster config error: {0}")]
    Config(String),

    /// API call rejected or failed
    #[error("kubernetes api error: {0}")]
    Api(String),

    /// Pods were still on the node when the drain bound expired
    #[error("drain of node {node} timed out after {timeout:?} ({remaining} pods remaining)")]
    DrainTimeout {
        /// Node being drained
        node: String,
        /// Configured bound
        timeout: Duration,
        /// Evictable pods still present
        remaining: usize,
    },

    /// Ready condition not observed within the bound
    #[error("node {node} not ready after {timeout:?}")]
    NotReady {
        /// Node being waited on
        node: String,
        /// Configured bound
        timeout: Duration,
    },
}
