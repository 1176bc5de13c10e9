//! Run summary aggregation and rendering

use kameo_macros::Reply;
use tracing::info;

use crate::state::{HostRecord, Outcome};

/// Aggregated result of a whole patch run
#[derive(Debug, Clone, Reply)]
pub struct RunSummary {
    /// Environment tag for the run
    pub environment: Option<String>,
    /// Hosts the resolver produced
    pub total: usize,
    /// Hosts that reached `Done`
    pub succeeded: usize,
    /// Hosts that finished `Failed`
    pub failed: usize,
    /// Whether the operator stopped the run early
    pub aborted: bool,
    /// Terminal host records, in processing order
    pub records: Vec<HostRecord>,
    /// Hosts never dequeued because the run was aborted
    pub unprocessed: Vec<String>,
}

impl RunSummary {
    /// Whether the run as a whole succeeded (drives the exit code)
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.total > 0 && self.failed == 0 && self.unprocessed.is_empty()
    }

    /// Render the final summary table
    #[must_use]
    pub fn render(&self) -> String {
        let width = self
            .records
            .iter()
            .map(|r| r.host.len())
            .chain(self.unprocessed.iter().map(String::len))
            .max()
            .unwrap_or(4)
            .max(4);

        let mut out = String::new();

        match &self.environment {
            Some(env) => out.push_str(&format!("patch run summary ({env})\n")),
            None => out.push_str("patch run summary\n"),
        }

        out.push_str(&format!("  {:<width$}  {:<8}  DETAIL\n", "HOST", "RESULT"));

        for record in &self.records {
            let detail = match (&record.outcome, &record.error) {
                (Outcome::Failed, Some(error)) => error.to_string(),
                _ => {
                    let mut parts = vec![format!("{} upgraded", record.upgraded)];
                    if record.rebooted {
                        parts.push("rebooted".to_string());
                    }
                    if !record.warnings.is_empty() {
                        parts.push(format!("{} warning(s)", record.warnings.len()));
                    }
                    parts.join(", ")
                }
            };
            out.push_str(&format!(
                "  {:<width$}  {:<8}  {detail}\n",
                record.host,
                record.outcome.to_string()
            ));

            for warning in &record.warnings {
                out.push_str(&format!("  {:<width$}  {:<8}  warning: {warning}\n", "", ""));
            }
        }

        for host in &self.unprocessed {
            out.push_str(&format!(
                "  {host:<width$}  {:<8}  not processed (run stopped)\n",
                "-"
            ));
        }

        out.push_str(&format!(
            "totals: {} host(s), {} succeeded, {} failed{}\n",
            self.total,
            self.succeeded,
            self.failed,
            if self.aborted { ", run aborted" } else { "" }
        ));

        out
    }
}

/// Collects terminal host records into a `RunSummary`
#[derive(Debug)]
pub struct Reporter {
    environment: Option<String>,
    records: Vec<HostRecord>,
    unprocessed: Vec<String>,
}

impl Reporter {
    #[must_use]
    pub fn new(environment: Option<String>) -> Self {
        Self {
            environment,
            records: Vec::new(),
            unprocessed: Vec::new(),
        }
    }

    /// Record a host that reached a terminal stage
    pub fn record(&mut self, record: HostRecord) {
        info!(
            host = %record.host,
            outcome = %record.outcome,
            upgraded = record.upgraded,
            rebooted = record.rebooted,
            "host finished"
        );
        self.records.push(record);
    }

    /// Record a host that was never processed
    pub fn skip(&mut self, host: &str) {
        self.unprocessed.push(host.to_string());
    }

    /// Build the final summary
    #[must_use]
    pub fn finish(self, total: usize, aborted: bool) -> RunSummary {
        let succeeded = self
            .records
            .iter()
            .filter(|r| r.outcome == Outcome::Succeeded)
            .count();
        let failed = self.records.len() - succeeded;

        RunSummary {
            environment: self.environment,
            total,
            succeeded,
            failed,
            aborted,
            records: self.records,
            unprocessed: self.unprocessed,
        }
    }
}
