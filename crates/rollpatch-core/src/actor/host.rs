//! `HostActor`: per-host patch pipeline
//!
//! Owns one host's run state for its lifetime and walks the stage machine
//! in order, emitting an event on every transition. The record it replies
//! with is the host's terminal state; the actor is stopped afterwards.

use std::sync::Arc;

use chrono::Utc;
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use rollpatch_exec::traits::RemoteExecutor;
use rollpatch_k8s::error::K8sError;
use rollpatch_k8s::traits::NodeController;
use rollpatch_os::error::OsError;
use rollpatch_os::traits::OsAdapter;
use rollpatch_os::types::OsFamily;

use crate::actor::orchestrator::HostComponentFactory;
use crate::config::{HostSpec, RunConfig};
use crate::error::{CoreError, HostError};
use crate::events::RunEvent;
use crate::preflight::PreflightChecker;
use crate::reboot::RebootCoordinator;
use crate::state::{HostRecord, Outcome, Stage};
use crate::validate::PostValidator;

/// Arguments for spawning a `HostActor`
pub struct HostActorArgs {
    /// The host to patch
    pub spec: HostSpec,
    /// Run configuration
    pub config: Arc<RunConfig>,
    /// Remote executor (SSH or local) for this host
    pub executor: Arc<dyn RemoteExecutor>,
    /// Cluster node controller
    pub node_controller: Arc<dyn NodeController>,
    /// Factory for late-bound per-host components (OS adapter)
    pub factory: Arc<dyn HostComponentFactory>,
    /// Event broadcast sender
    pub event_tx: broadcast::Sender<RunEvent>,
}

/// Run the full patch pipeline for this host
#[derive(Debug)]
pub struct RunPatch;

/// Per-host actor owning the stage machine
pub struct HostActor {
    spec: HostSpec,
    config: Arc<RunConfig>,
    executor: Arc<dyn RemoteExecutor>,
    node_controller: Arc<dyn NodeController>,
    factory: Arc<dyn HostComponentFactory>,
    event_tx: broadcast::Sender<RunEvent>,

    /// Current stage
    stage: Stage,
    /// Discovered lazily on first contact, cached for the run
    os_family: Option<OsFamily>,
    /// `None` until probed; `Some(None)` means not a cluster member
    membership: Option<Option<String>>,
    /// Whether commands need a sudo prefix on this host
    use_sudo: bool,
    /// Whether the node was (logically) drained this run
    drained: bool,
    /// Whether uncordon has been attempted
    uncordoned: bool,
    /// Non-fatal findings
    warnings: Vec<String>,
    /// Packages upgraded
    upgraded: u32,
    /// Whether a reboot happened
    rebooted: bool,
}

impl HostActor {
    /// Get the hostname
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Get current stage
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Advance the stage machine and emit the transition event
    fn transition_to(&mut self, next: Stage) {
        if !self.stage.can_transition_to(next) {
            // stages are driven linearly below; this firing means a bug
            warn!(
                host = %self.spec.name,
                from = %self.stage,
                to = %next,
                "unexpected stage transition"
            );
        }

        let from = self.stage;
        self.stage = next;

        info!(
            host = %self.spec.name,
            from = %from,
            to = %next,
            "stage transition"
        );

        // Ignore send errors (no subscribers is fine)
        let _ = self.event_tx.send(RunEvent::StageChanged {
            host: self.spec.name.clone(),
            from: from.to_string(),
            to: next.to_string(),
        });
    }

    /// Note a stage that completed as a no-op
    fn emit_skipped(&self, stage: Stage, reason: &str) {
        debug!(host = %self.spec.name, stage = %stage, reason, "stage is a no-op");
        let _ = self.event_tx.send(RunEvent::StageSkipped {
            host: self.spec.name.clone(),
            stage: stage.to_string(),
            reason: reason.to_string(),
        });
    }

    /// The full pipeline; any error finalizes the host as failed
    async fn run_pipeline(&mut self) -> Result<(), HostError> {
        self.transition_to(Stage::Precheck);
        let preflight = PreflightChecker::new(self.executor.clone(), self.config.clone());
        preflight.reachability(&self.spec.name).await?;

        let adapter = self.discover().await?;

        preflight.disk_headroom(&self.spec.name).await?;
        preflight
            .package_manager_idle(&self.spec.name, adapter.as_ref())
            .await?;
        preflight.pre_hook(&self.spec.name).await?;

        self.transition_to(Stage::Draining);
        self.drain_host().await?;

        self.transition_to(Stage::Patching);
        self.patch_host(adapter.as_ref()).await?;

        self.transition_to(Stage::RebootWait);
        let coordinator = RebootCoordinator::new(
            self.executor.clone(),
            adapter.clone(),
            self.config.clone(),
            self.use_sudo,
        );
        self.rebooted = coordinator.run(&self.spec.name).await?;

        self.transition_to(Stage::Uncordoning);
        if self.drained {
            self.uncordon_once().await;
        } else {
            self.emit_skipped(Stage::Uncordoning, "node was not drained");
        }

        self.transition_to(Stage::Validating);
        let node = self
            .resolve_membership()
            .await
            .map_err(|e| HostError::NodeNotReady(e.to_string()))?;
        let validator = PostValidator::new(
            self.executor.clone(),
            self.node_controller.clone(),
            self.config.clone(),
        );
        let warnings = validator.run(&self.spec.name, node.as_deref()).await?;
        self.warnings.extend(warnings);

        Ok(())
    }

    /// First-contact discovery: privilege level and OS family
    async fn discover(&mut self) -> Result<Arc<dyn OsAdapter>, HostError> {
        let whoami = self.executor.run("whoami").await;
        self.use_sudo = whoami
            .as_ref()
            .map(|r| r.stdout.trim() != "root")
            .unwrap_or(true);

        let family = rollpatch_os::detect_family(self.executor.as_ref())
            .await
            .map_err(|e| HostError::Os(e.to_string()))?;
        self.os_family = Some(family);

        info!(
            host = %self.spec.name,
            family = %family,
            sudo = self.use_sudo,
            "discovered host facts"
        );

        Ok(self.factory.create_os_adapter(
            family,
            self.executor.clone(),
            self.use_sudo,
            self.config.timeouts.update,
        ))
    }

    /// Cluster membership, probed once and cached
    async fn resolve_membership(&mut self) -> Result<Option<String>, K8sError> {
        if let Some(cached) = &self.membership {
            return Ok(cached.clone());
        }

        let resolved = match &self.spec.node_name {
            Some(explicit) => Some(explicit.clone()),
            None => self.node_controller.resolve_node(&self.spec.name).await?,
        };

        if let Some(node) = &resolved {
            info!(host = %self.spec.name, node = %node, "host is a cluster member");
        }

        self.membership = Some(resolved.clone());
        Ok(resolved)
    }

    /// DRAINING stage
    async fn drain_host(&mut self) -> Result<(), HostError> {
        if self.config.skip_drain {
            self.emit_skipped(Stage::Draining, "drain disabled for this run");
            return Ok(());
        }

        let node = self
            .resolve_membership()
            .await
            .map_err(|e| HostError::Drain(e.to_string()))?;
        let Some(node) = node else {
            self.emit_skipped(Stage::Draining, "not a cluster member");
            return Ok(());
        };

        if self.config.dry_run {
            info!(host = %self.spec.name, node = %node, "[DRY-RUN] would drain node");
            self.drained = true;
            return Ok(());
        }

        self.node_controller
            .drain(&node, self.config.timeouts.drain)
            .await
            .map_err(|e| HostError::Drain(e.to_string()))?;
        self.drained = true;

        Ok(())
    }

    /// PATCHING stage
    async fn patch_host(&mut self, adapter: &dyn OsAdapter) -> Result<(), HostError> {
        if self.config.dry_run {
            match adapter.list_upgradable().await {
                Ok(packages) => {
                    let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
                    info!(
                        host = %self.spec.name,
                        count = packages.len(),
                        packages = ?names,
                        "[DRY-RUN] would upgrade packages"
                    );
                }
                Err(e) => {
                    self.warnings
                        .push(format!("could not preview upgradable packages: {e}"));
                }
            }
            return Ok(());
        }

        let outcome = adapter.update_packages().await.map_err(|e| match e {
            OsError::LockHeld(detail) => HostError::PackageManagerBusy(detail),
            OsError::UpdateFailed { status, detail } => {
                HostError::PackageUpdate(format!("exit status {status}: {detail}"))
            }
            other => HostError::PackageUpdate(other.to_string()),
        })?;

        self.upgraded = outcome.upgraded;
        Ok(())
    }

    /// Uncordon at most once per run, best-effort. Failures become
    /// warnings; they never override the host's outcome.
    async fn uncordon_once(&mut self) {
        if self.uncordoned {
            return;
        }
        self.uncordoned = true;

        let Some(Some(node)) = self.membership.clone() else {
            return;
        };

        if self.config.dry_run {
            info!(host = %self.spec.name, node = %node, "[DRY-RUN] would uncordon node");
            return;
        }

        if let Err(e) = self.node_controller.uncordon(&node).await {
            warn!(
                host = %self.spec.name,
                node = %node,
                error = %e,
                "uncordon failed, node left unschedulable"
            );
            self.warnings.push(format!("uncordon failed: {e}"));
        }
    }

    /// Finalize a failed host: compensate a completed drain, then move to
    /// `Failed`
    async fn finalize_failure(&mut self, err: &HostError) {
        if self.drained && !self.uncordoned {
            self.uncordon_once().await;
        }

        let previous = self.stage;
        error!(
            host = %self.spec.name,
            stage = %previous,
            error = %err,
            "host failed"
        );
        self.transition_to(Stage::Failed);
    }
}

impl Actor for HostActor {
    type Args = HostActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        debug!(host = %args.spec.name, id = %actor_ref.id(), "HostActor starting");

        Ok(Self {
            spec: args.spec,
            config: args.config,
            executor: args.executor,
            node_controller: args.node_controller,
            factory: args.factory,
            event_tx: args.event_tx,
            stage: Stage::Pending,
            os_family: None,
            membership: None,
            use_sudo: true,
            drained: false,
            uncordoned: false,
            warnings: Vec::new(),
            upgraded: 0,
            rebooted: false,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        debug!(host = %self.spec.name, reason = ?reason, "HostActor stopping");
        Ok(())
    }
}

impl Message<RunPatch> for HostActor {
    type Reply = Result<HostRecord, CoreError>;

    async fn handle(
        &mut self,
        _msg: RunPatch,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let started_at = Utc::now();

        let (outcome, error) = match self.run_pipeline().await {
            Ok(()) => {
                self.transition_to(Stage::Done);
                (Outcome::Succeeded, None)
            }
            Err(e) => {
                self.finalize_failure(&e).await;
                (Outcome::Failed, Some(e))
            }
        };

        let _ = self.event_tx.send(RunEvent::HostCompleted {
            host: self.spec.name.clone(),
            outcome: outcome.to_string(),
            error: error.as_ref().map(ToString::to_string),
        });

        Ok(HostRecord {
            host: self.spec.name.clone(),
            os_family: self.os_family,
            stage: self.stage,
            outcome,
            error,
            warnings: std::mem::take(&mut self.warnings),
            upgraded: self.upgraded,
            rebooted: self.rebooted,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
