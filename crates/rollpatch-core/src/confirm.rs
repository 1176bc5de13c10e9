//! Operator confirmation seam
//!
//! The continue/abort decision after a failed host goes through this
//! trait so the orchestrator never talks to a TTY directly.

use async_trait::async_trait;
use tracing::warn;

/// A yes/no decision provider
#[async_trait]
pub trait ConfirmationProvider: Send + Sync {
    /// Ask the operator; `false` means stop
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Interactive terminal prompt (default in production)
#[derive(Debug, Clone, Default)]
pub struct TerminalPrompt;

#[async_trait]
impl ConfirmationProvider for TerminalPrompt {
    async fn confirm(&self, prompt: &str) -> bool {
        let prompt = prompt.to_string();

        let answer = tokio::task::spawn_blocking(move || {
            use std::io::Write;

            let mut stdout = std::io::stdout();
            write!(stdout, "{prompt} [y/N] ").ok();
            stdout.flush().ok();

            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_err() {
                return false;
            }
            matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
        })
        .await;

        match answer {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "confirmation prompt failed, treating as decline");
                false
            }
        }
    }
}

/// Always answers yes (`--yes` / unattended runs)
#[derive(Debug, Clone, Default)]
pub struct AssumeYes;

#[async_trait]
impl ConfirmationProvider for AssumeYes {
    async fn confirm(&self, prompt: &str) -> bool {
        warn!(prompt, "continuing without confirmation (--yes)");
        true
    }
}
