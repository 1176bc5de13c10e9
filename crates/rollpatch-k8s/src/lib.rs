//! rollpatch-k8s: cluster node coordination
//!
//! Wraps the drain / uncordon / Ready-condition operations the patch
//! pipeline needs against the Kubernetes API, keyed by node name.

pub mod controller;
pub mod error;
pub mod traits;

pub use controller::KubeNodeController;
pub use error::K8sError;
pub use traits::{NoClusterController, NodeController};
