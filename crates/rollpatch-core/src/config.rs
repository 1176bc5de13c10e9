//! Run configuration types
//!
//! `RunConfig` is built once from CLI input and never mutated; every
//! component receives it behind an `Arc` instead of reading process-wide
//! state.

use std::time::Duration;

/// What the run targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelection {
    /// A single explicit host
    Host(String),
    /// A named inventory group
    Group(String),
    /// Every inventory host
    All,
}

/// Immutable configuration for one patch run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Target selection from the CLI
    pub target: TargetSelection,
    /// Environment tag carried into logs and the summary
    pub environment: Option<String>,
    /// Log instead of executing anything mutating
    pub dry_run: bool,
    /// Never reboot, even when the OS asks for it
    pub skip_reboot: bool,
    /// Never drain/uncordon cluster nodes
    pub skip_drain: bool,
    /// Command run on each host before any mutation
    pub pre_hook: Option<String>,
    /// Command run on each host after validation starts
    pub post_hook: Option<String>,
    /// Stage bounds
    pub timeouts: Timeouts,
}

impl RunConfig {
    /// Config with defaults for everything but the target
    #[must_use]
    pub fn for_target(target: TargetSelection) -> Self {
        Self {
            target,
            environment: None,
            dry_run: false,
            skip_reboot: false,
            skip_drain: false,
            pre_hook: None,
            post_hook: None,
            timeouts: Timeouts::default(),
        }
    }
}

/// Default bound on SSH connect + reachability probes
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on the package upgrade itself
const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(1800);

/// Default bound on draining a node
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(300);

/// How long to assume the host is still going down after a delayed
/// reboot; distinct from the poll interval, which bounds how often we
/// probe once the host may be back
const DEFAULT_REBOOT_GRACE: Duration = Duration::from_secs(90);

/// Default total wait for a host to come back, measured from reboot issue
const DEFAULT_REBOOT_TOTAL: Duration = Duration::from_secs(300);

/// Default interval between reachability probes during reboot recovery
const DEFAULT_REBOOT_POLL: Duration = Duration::from_secs(10);

/// Default total wait for the node Ready condition
const DEFAULT_READY_TOTAL: Duration = Duration::from_secs(120);

/// Default interval between Ready condition reads
const DEFAULT_READY_POLL: Duration = Duration::from_secs(10);

/// Per-stage time bounds
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// SSH connect / reachability probe bound
    pub connect: Duration,
    /// Package upgrade bound
    pub update: Duration,
    /// Drain bound
    pub drain: Duration,
    /// Post-reboot quiet period before the first probe
    pub reboot_grace: Duration,
    /// Total reboot recovery bound
    pub reboot_total: Duration,
    /// Reboot recovery probe interval
    pub reboot_poll: Duration,
    /// Ready condition bound
    pub ready_total: Duration,
    /// Ready condition poll interval
    pub ready_poll: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            update: DEFAULT_UPDATE_TIMEOUT,
            drain: DEFAULT_DRAIN_TIMEOUT,
            reboot_grace: DEFAULT_REBOOT_GRACE,
            reboot_total: DEFAULT_REBOOT_TOTAL,
            reboot_poll: DEFAULT_REBOOT_POLL,
            ready_total: DEFAULT_READY_TOTAL,
            ready_poll: DEFAULT_READY_POLL,
        }
    }
}

/// A resolved host with its connection parameters
#[derive(Debug, Clone)]
pub struct HostSpec {
    /// Hostname identifier used in logs and the summary
    pub name: String,
    /// Address to connect to
    pub addr: String,
    /// SSH user
    pub user: String,
    /// SSH port
    pub port: u16,
    /// SSH key path, when not using the fleet default
    pub ssh_key: Option<String>,
    /// Cluster node name override; membership is otherwise discovered
    pub node_name: Option<String>,
}

impl HostSpec {
    /// Spec connecting to `name` as root on port 22
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            addr: name.clone(),
            name,
            user: "root".to_string(),
            port: 22,
            ssh_key: None,
            node_name: None,
        }
    }
}
