//! Run progress events
//!
//! Emitted over a broadcast channel as the stage machine advances, so the
//! CLI (or any other subscriber) can render per-host progress without
//! coupling to the actors.

use serde::{Deserialize, Serialize};

/// Progress event for one patch run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    /// A host moved to a new stage
    StageChanged {
        host: String,
        from: String,
        to: String,
    },
    /// A stage completed as a no-op
    StageSkipped {
        host: String,
        stage: String,
        reason: String,
    },
    /// A host reached a terminal stage
    HostCompleted {
        host: String,
        outcome: String,
        error: Option<String>,
    },
    /// The run finished
    RunCompleted {
        total: usize,
        succeeded: usize,
        failed: usize,
    },
}
