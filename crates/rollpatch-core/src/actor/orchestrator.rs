//! `OrchestratorActor`: fleet sequencing
//!
//! Processes the resolved host list strictly one host at a time: draining
//! two cluster nodes concurrently could drop available capacity below a
//! safe margin for rescheduled workloads, so sequencing is a safety
//! property here, not a scheduling detail. After a failed host the
//! injected confirmation provider decides whether the run continues.

use std::sync::Arc;

use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tokio::sync::broadcast;
use tracing::{info, warn};

use rollpatch_exec::traits::RemoteExecutor;
use rollpatch_k8s::traits::NodeController;
use rollpatch_os::traits::OsAdapter;
use rollpatch_os::types::OsFamily;

use crate::actor::host::{HostActor, HostActorArgs, RunPatch};
use crate::config::{HostSpec, RunConfig};
use crate::confirm::ConfirmationProvider;
use crate::error::{CoreError, HostError};
use crate::events::RunEvent;
use crate::report::{Reporter, RunSummary};
use crate::state::{HostRecord, Outcome};

/// Factory trait for per-host component wiring
///
/// Allows injection of different executors/adapters per host; tests swap
/// in mocks here.
#[async_trait::async_trait]
pub trait HostComponentFactory: Send + Sync {
    /// Create a remote executor for the given host
    async fn create_executor(&self, spec: &HostSpec)
    -> Result<Arc<dyn RemoteExecutor>, CoreError>;

    /// Create the OS adapter once the family is known
    fn create_os_adapter(
        &self,
        family: OsFamily,
        executor: Arc<dyn RemoteExecutor>,
        use_sudo: bool,
        update_timeout: std::time::Duration,
    ) -> Arc<dyn OsAdapter> {
        rollpatch_os::adapter_for(family, executor, use_sudo, update_timeout)
    }

    /// The node controller shared by every host in the run
    fn node_controller(&self) -> Arc<dyn NodeController>;
}

/// Arguments for spawning an `OrchestratorActor`
pub struct OrchestratorActorArgs {
    /// Immutable run configuration
    pub config: Arc<RunConfig>,
    /// Factory for per-host components
    pub factory: Arc<dyn HostComponentFactory>,
    /// Continue/abort decision after a failed host
    pub confirmation: Arc<dyn ConfirmationProvider>,
    /// Event broadcast sender shared with subscribers
    pub event_tx: broadcast::Sender<RunEvent>,
}

/// Process the resolved host list
#[derive(Debug)]
pub struct RunFleet {
    /// Hosts in patch order
    pub hosts: Vec<HostSpec>,
}

/// Fleet orchestrator driving one host at a time
pub struct OrchestratorActor {
    config: Arc<RunConfig>,
    factory: Arc<dyn HostComponentFactory>,
    confirmation: Arc<dyn ConfirmationProvider>,
    event_tx: broadcast::Sender<RunEvent>,
}

impl OrchestratorActor {
    /// Run one host's pipeline to its terminal record
    async fn run_host(&self, spec: &HostSpec) -> Result<HostRecord, CoreError> {
        let executor = match self.factory.create_executor(spec).await {
            Ok(executor) => executor,
            Err(e) => {
                // connection setup failed before the pipeline started
                let record =
                    HostRecord::setup_failure(spec, HostError::Unreachable(e.to_string()));
                let _ = self.event_tx.send(RunEvent::HostCompleted {
                    host: record.host.clone(),
                    outcome: record.outcome.to_string(),
                    error: record.error.as_ref().map(ToString::to_string),
                });
                return Ok(record);
            }
        };

        let args = HostActorArgs {
            spec: spec.clone(),
            config: self.config.clone(),
            executor,
            node_controller: self.factory.node_controller(),
            factory: self.factory.clone(),
            event_tx: self.event_tx.clone(),
        };

        let actor_ref = HostActor::spawn(args);

        let record = match actor_ref.ask(RunPatch).await {
            Ok(record) => record,
            Err(e) => return Err(CoreError::Actor(e.to_string())),
        };

        actor_ref.stop_gracefully().await.ok();

        Ok(record)
    }
}

impl Actor for OrchestratorActor {
    type Args = OrchestratorActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(id = %actor_ref.id(), "OrchestratorActor starting");

        Ok(Self {
            config: args.config,
            factory: args.factory,
            confirmation: args.confirmation,
            event_tx: args.event_tx,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(reason = ?reason, "OrchestratorActor stopping");
        Ok(())
    }
}

impl Message<RunFleet> for OrchestratorActor {
    type Reply = Result<RunSummary, CoreError>;

    async fn handle(
        &mut self,
        msg: RunFleet,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let total = msg.hosts.len();
        let mut reporter = Reporter::new(self.config.environment.clone());
        let mut aborted = false;

        info!(
            total,
            dry_run = self.config.dry_run,
            skip_reboot = self.config.skip_reboot,
            skip_drain = self.config.skip_drain,
            "starting patch run"
        );

        for (index, spec) in msg.hosts.iter().enumerate() {
            if aborted {
                reporter.skip(&spec.name);
                continue;
            }

            info!(
                host = %spec.name,
                position = index + 1,
                total,
                "processing host"
            );

            let record = self.run_host(spec).await?;
            let failed = record.outcome == Outcome::Failed;
            reporter.record(record);

            let remaining = total - index - 1;
            if failed && remaining > 0 {
                let prompt = format!(
                    "host {} failed; continue with {remaining} remaining host(s)?",
                    spec.name
                );
                if !self.confirmation.confirm(&prompt).await {
                    warn!(host = %spec.name, "operator declined, stopping run");
                    aborted = true;
                }
            }
        }

        let summary = reporter.finish(total, aborted);

        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            aborted = summary.aborted,
            "patch run finished"
        );

        let _ = self.event_tx.send(RunEvent::RunCompleted {
            total: summary.total,
            succeeded: summary.succeeded,
            failed: summary.failed,
        });

        Ok(summary)
    }
}
