//! rollpatch-core: patch run orchestration
//!
//! Implements the per-host patch pipeline and the fleet sequencer as
//! kameo actors: one `HostActor` at a time walks the stage machine
//! (precheck, drain, patch, reboot, uncordon, validate) while the
//! `OrchestratorActor` enforces strict host-by-host sequencing and the
//! continue/abort decision after a failure.

pub mod actor;
pub mod config;
pub mod confirm;
pub mod error;
pub mod events;
pub mod preflight;
pub mod reboot;
pub mod report;
pub mod state;
pub mod validate;

pub use actor::host::{HostActor, HostActorArgs, RunPatch};
pub use actor::orchestrator::{
    HostComponentFactory, OrchestratorActor, OrchestratorActorArgs, RunFleet,
};
pub use config::{HostSpec, RunConfig, TargetSelection, Timeouts};
pub use confirm::{AssumeYes, ConfirmationProvider, TerminalPrompt};
pub use error::{CoreError, HostError};
pub use events::RunEvent;
pub use preflight::PreflightChecker;
pub use reboot::RebootCoordinator;
pub use report::{Reporter, RunSummary};
pub use state::{HostRecord, Outcome, Stage};
pub use validate::PostValidator;
