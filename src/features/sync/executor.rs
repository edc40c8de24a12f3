//! Replay of queued operations against the remote store.
//!
//! Executes one operation at a time with the configured retry policy and
//! collects the outcome of a drain pass.

use colored::Colorize;
use serde::Serialize;

use super::operation::{OperationKind, PendingOperation};
use super::remote::{self, RemoteStore};
use super::retry::{with_retry, RetryPolicy};
use crate::error::RallyError;

/// Result of replaying a single operation.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Target collection
    pub collection: String,
    /// Operation kind
    pub kind: OperationKind,
    /// Human-readable summary
    pub description: String,
    /// Error message if the operation was re-queued
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Whether the remote store accepted the operation.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a drain.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DrainReport {
    /// Operations confirmed by the remote store
    pub applied: usize,
    /// Operations that failed and went back to the tail of the queue
    pub requeued: usize,
    /// The drain found the system offline and did nothing
    pub offline: bool,
    /// Another drain was running; this request was folded into it
    pub coalesced: bool,
    /// Individual results, in replay order
    pub results: Vec<ExecutionResult>,
}

impl DrainReport {
    /// Record the outcome of one operation.
    pub fn add(&mut self, result: ExecutionResult) {
        if result.succeeded() {
            self.applied += 1;
        } else {
            self.requeued += 1;
        }
        self.results.push(result);
    }

    /// Fold a later pass into this report.
    pub fn merge(&mut self, other: Self) {
        self.applied += other.applied;
        self.requeued += other.requeued;
        self.offline = other.offline;
        self.results.extend(other.results);
    }

    /// Total operations attempted.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.applied + self.requeued
    }
}

/// Replay `op` against `remote`, retrying per `policy`.
///
/// # Errors
///
/// Returns the remote error of the final attempt.
pub async fn replay(
    remote: &dyn RemoteStore,
    policy: RetryPolicy,
    op: &PendingOperation,
) -> Result<(), RallyError> {
    with_retry(policy, move || remote::apply(remote, op)).await
}

/// Build the per-operation result record.
#[must_use]
pub fn execution_result(op: &PendingOperation, error: Option<&RallyError>) -> ExecutionResult {
    ExecutionResult {
        collection: op.collection.to_string(),
        kind: op.kind(),
        description: op.describe(),
        error: error.map(ToString::to_string),
    }
}

/// Format a drain report for display.
#[must_use]
pub fn format_drain_report(report: &DrainReport) -> String {
    if report.coalesced && report.total() == 0 {
        return "A sync is already running; it will pick up pending changes.".to_string();
    }
    if report.offline && report.total() == 0 {
        return format!("{} Offline - changes stay queued.", "○".yellow());
    }
    if report.total() == 0 {
        return "No pending changes to sync.".to_string();
    }

    let mut lines = Vec::new();

    lines.push(format!("Sync completed: {} operations", report.total()));
    lines.push("─".repeat(40));

    if report.applied > 0 {
        lines.push(format!(
            "  {} {}",
            "✓".green(),
            format!("{} applied", report.applied).green()
        ));
    }

    if report.requeued > 0 {
        lines.push(format!(
            "  {} {}",
            "✗".red(),
            format!("{} re-queued", report.requeued).red()
        ));
    }

    let errors: Vec<_> = report
        .results
        .iter()
        .filter(|r| r.error.is_some())
        .take(3)
        .collect();

    if !errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors:".to_string());
        for err in errors {
            lines.push(format!(
                "  - {}: {}",
                err.description,
                err.error.as_deref().unwrap_or("Unknown error")
            ));
        }
    }

    lines.join("\n")
}
