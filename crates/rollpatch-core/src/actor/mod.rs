//! Actor implementations

pub mod host;
pub mod orchestrator;

pub use host::{HostActor, HostActorArgs, RunPatch};
pub use orchestrator::{HostComponentFactory, OrchestratorActor, OrchestratorActorArgs, RunFleet};
