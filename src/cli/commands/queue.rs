//! Sync queue command implementations.
//!
//! Handles status, enqueue, list, sync, clear and watch.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;

use crate::cli::args::{EnqueueArgs, OutputFormat};
use crate::error::RallyError;
use crate::features::sync::{format_drain_report, Collection, OfflineSync, Payload};
use crate::output::{format_age, format_pending, to_json};

#[derive(Debug, Serialize)]
struct Status {
    online: bool,
    pending: usize,
    oldest_pending: Option<DateTime<Utc>>,
    last_sync: Option<DateTime<Utc>>,
    cached: Vec<String>,
}

/// Show queue status.
///
/// # Errors
///
/// Returns an error if the cache keys cannot be listed or output formatting fails.
pub async fn status(sync: &OfflineSync, format: OutputFormat) -> Result<String, RallyError> {
    let online = sync.probe().await;

    let status = Status {
        online,
        pending: sync.pending_count(),
        oldest_pending: sync.oldest_pending(),
        last_sync: sync.last_sync_time(),
        cached: sync.cached_collections()?,
    };

    match format {
        OutputFormat::Json => to_json(&status),
        OutputFormat::Pretty => {
            let mut lines = Vec::new();

            lines.push("Sync Status".bold().to_string());
            lines.push("─".repeat(40));

            lines.push(format!(
                "  Backend:    {}",
                if status.online {
                    "online".green()
                } else {
                    "offline".yellow()
                }
            ));

            lines.push(format!(
                "  Pending:    {} {}",
                status.pending,
                if status.pending > 0 {
                    "changes waiting".dimmed()
                } else {
                    "".dimmed()
                }
            ));

            if let Some(oldest) = status.oldest_pending {
                lines.push(format!("  Oldest:     {}", format_age(oldest).dimmed()));
            }

            lines.push(format!(
                "  Last sync:  {}",
                status
                    .last_sync
                    .map_or_else(|| "never".to_string(), format_age)
            ));
            lines.push(format!("  Cached:     {} tables", status.cached.len()));

            if status.pending > 0 && status.online {
                lines.push(String::new());
                lines.push(
                    "Run 'rallysync sync' to send pending changes"
                        .dimmed()
                        .to_string(),
                );
            }

            Ok(lines.join("\n"))
        }
    }
}

/// Build the payload for an enqueue request.
///
/// `--id` is merged into the record, overriding any `id` already in `--data`.
fn build_payload(args: &EnqueueArgs) -> Result<Payload, RallyError> {
    let mut record = match args.data.as_deref() {
        Some(data) => serde_json::from_str::<Value>(data)?,
        None => Value::Object(serde_json::Map::new()),
    };

    if let Some(id) = &args.id {
        let Value::Object(fields) = &mut record else {
            return Err(RallyError::InvalidOperation(
                "--data must be a JSON object".to_string(),
            ));
        };
        fields.insert("id".to_string(), Value::String(id.clone()));
    }

    Payload::from_record(args.kind, record)
}

/// Queue a write, replaying it straight away when the backend is reachable.
///
/// # Errors
///
/// Returns an error if the request is malformed or the queue cannot be saved.
pub async fn enqueue(
    sync: &OfflineSync,
    args: EnqueueArgs,
    format: OutputFormat,
) -> Result<String, RallyError> {
    let collection = Collection::new(&args.collection)?;
    if !collection.is_known() {
        tracing::warn!("'{collection}' is not a known table; queueing anyway");
    }
    let payload = build_payload(&args)?;

    sync.probe().await;
    let op = sync.enqueue(collection, payload).await?;
    let report = sync.settle().await;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({
            "queued": op,
            "sync": report,
            "pending": sync.pending_count(),
        })),
        OutputFormat::Pretty => {
            let mut lines = vec![format!("Queued {}", op.describe())];
            if report.total() > 0 {
                lines.push(format_drain_report(&report));
            } else {
                lines.push(
                    format!("{} change(s) pending sync", sync.pending_count())
                        .dimmed()
                        .to_string(),
                );
            }
            Ok(lines.join("\n"))
        }
    }
}

/// List queued operations.
///
/// # Errors
///
/// Returns an error if output formatting fails.
pub fn list(sync: &OfflineSync, format: OutputFormat) -> Result<String, RallyError> {
    format_pending(&sync.pending(), format)
}

/// Replay pending operations now.
///
/// # Errors
///
/// Returns an error if output formatting fails.
pub async fn run_sync(sync: &OfflineSync, format: OutputFormat) -> Result<String, RallyError> {
    sync.probe().await;
    let report = sync.drain().await;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({
            "applied": report.applied,
            "requeued": report.requeued,
            "offline": report.offline,
            "pending": sync.pending_count(),
            "results": report.results,
        })),
        OutputFormat::Pretty => Ok(format_drain_report(&report)),
    }
}

/// Drop every pending operation.
///
/// # Errors
///
/// Returns an error without `--force`, or if the queue cannot be saved.
pub fn clear(sync: &OfflineSync, force: bool, format: OutputFormat) -> Result<String, RallyError> {
    if !force {
        return Err(RallyError::InvalidOperation(
            "Use --force to drop pending changes".to_string(),
        ));
    }

    let count = sync.clear_queue()?;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({"cleared": count})),
        OutputFormat::Pretty => Ok(format!("Dropped {count} pending change(s)")),
    }
}

/// Sync in the background until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the interrupt handler cannot be installed.
pub async fn watch(sync: &mut OfflineSync, format: OutputFormat) -> Result<String, RallyError> {
    let report = sync.start().await;
    if format == OutputFormat::Pretty {
        eprintln!("{}", format_drain_report(&report));
        eprintln!("{}", "Watching for connectivity changes (Ctrl-C to stop)".dimmed());
    }

    tokio::signal::ctrl_c().await?;
    sync.shutdown().await;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({
            "pending": sync.pending_count(),
            "last_sync": sync.last_sync_time(),
        })),
        OutputFormat::Pretty => Ok(format!(
            "Stopped. {} change(s) pending sync",
            sync.pending_count()
        )),
    }
}
