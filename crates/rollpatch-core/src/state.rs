//! Per-host stage machine and run records

use chrono::{DateTime, Utc};
use kameo_macros::Reply;
use rollpatch_os::OsFamily;
use serde::{Deserialize, Serialize};

use crate::config::HostSpec;
use crate::error::HostError;

/// Stages a host moves through during a patch run.
///
/// The path is linear; `Failed` is reachable from every non-terminal
/// stage. Stages that do not apply to a host (non-member, skip flags)
/// are still entered and complete as no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Precheck,
    Draining,
    Patching,
    RebootWait,
    Uncordoning,
    Validating,
    Done,
    Failed,
}

impl Stage {
    /// The next stage on the success path
    #[must_use]
    pub fn successor(self) -> Option<Stage> {
        match self {
            Stage::Pending => Some(Stage::Precheck),
            Stage::Precheck => Some(Stage::Draining),
            Stage::Draining => Some(Stage::Patching),
            Stage::Patching => Some(Stage::RebootWait),
            Stage::RebootWait => Some(Stage::Uncordoning),
            Stage::Uncordoning => Some(Stage::Validating),
            Stage::Validating => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }

    /// Whether the host has finished, successfully or not
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// Whether moving to `next` is a legal transition
    #[must_use]
    pub fn can_transition_to(self, next: Stage) -> bool {
        if next == Stage::Failed {
            return !self.is_terminal();
        }
        self.successor() == Some(next)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Precheck => "precheck",
            Stage::Draining => "draining",
            Stage::Patching => "patching",
            Stage::RebootWait => "reboot_wait",
            Stage::Uncordoning => "uncordoning",
            Stage::Validating => "validating",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal result for a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded => f.write_str("ok"),
            Outcome::Failed => f.write_str("failed"),
        }
    }
}

/// Terminal record of one host's run, produced by its `HostActor` when
/// the stage machine finishes and summarized by the reporter.
#[derive(Debug, Clone, Reply)]
pub struct HostRecord {
    /// Host name
    pub host: String,
    /// OS family, when discovery got that far
    pub os_family: Option<OsFamily>,
    /// Terminal stage (`Done` or `Failed`)
    pub stage: Stage,
    /// Terminal result
    pub outcome: Outcome,
    /// The failure that stopped the pipeline, if any
    pub error: Option<HostError>,
    /// Non-fatal findings (failed services, hook problems, uncordon issues)
    pub warnings: Vec<String>,
    /// Packages upgraded
    pub upgraded: u32,
    /// Whether the host was rebooted
    pub rebooted: bool,
    /// When the host was dequeued
    pub started_at: DateTime<Utc>,
    /// When the host reached a terminal stage
    pub finished_at: DateTime<Utc>,
}

impl HostRecord {
    /// Record for a host whose connection setup failed before the
    /// pipeline could start
    #[must_use]
    pub fn setup_failure(spec: &HostSpec, error: HostError) -> Self {
        let now = Utc::now();
        Self {
            host: spec.name.clone(),
            os_family: None,
            stage: Stage::Failed,
            outcome: Outcome::Failed,
            error: Some(error),
            warnings: Vec::new(),
            upgraded: 0,
            rebooted: false,
            started_at: now,
            finished_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_stage_walk() {
        let mut stage = Stage::Pending;
        let expected = [
            Stage::Precheck,
            Stage::Draining,
            Stage::Patching,
            Stage::RebootWait,
            Stage::Uncordoning,
            Stage::Validating,
            Stage::Done,
        ];

        for next in expected {
            assert!(stage.can_transition_to(next), "{stage} -> {next}");
            stage = next;
        }
        assert!(stage.is_terminal());
    }

    #[test]
    fn test_failed_reachable_from_non_terminal() {
        for stage in [
            Stage::Pending,
            Stage::Precheck,
            Stage::Draining,
            Stage::Patching,
            Stage::RebootWait,
            Stage::Uncordoning,
            Stage::Validating,
        ] {
            assert!(stage.can_transition_to(Stage::Failed), "{stage}");
        }
    }

    #[test]
    fn test_terminal_stages_stuck() {
        assert!(!Stage::Done.can_transition_to(Stage::Failed));
        assert!(!Stage::Failed.can_transition_to(Stage::Failed));
        assert_eq!(Stage::Done.successor(), None);
    }

    #[test]
    fn test_no_stage_skipping() {
        assert!(!Stage::Precheck.can_transition_to(Stage::Patching));
        assert!(!Stage::Draining.can_transition_to(Stage::Done));
    }
}
