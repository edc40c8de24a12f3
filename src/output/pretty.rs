use chrono::{DateTime, Utc};
use colored::Colorize;
use serde_json::Value;

use crate::features::export::{ExportKind, TeamSummary};
use crate::features::sync::{CacheEntry, OperationKind, PendingOperation};

/// Rough age of a timestamp, e.g. `3 hours ago`.
pub fn format_age(at: DateTime<Utc>) -> String {
    let age = Utc::now().signed_duration_since(at);
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

/// Format pending operations as a table in replay order
pub fn format_pending_pretty(ops: &[PendingOperation]) -> String {
    if ops.is_empty() {
        return "No pending changes.".to_string();
    }

    let mut lines = Vec::new();
    lines.push(format!("Pending Changes ({})", ops.len()));
    lines.push("─".repeat(60));
    lines.push(format!(
        "{:<4} {:<8} {:<20} {:<10} {}",
        "#", "Kind", "Collection", "Id", "Queued"
    ));
    lines.push("─".repeat(60));

    for (i, op) in ops.iter().enumerate() {
        let kind = match op.kind() {
            OperationKind::Insert => "insert".green(),
            OperationKind::Update => "update".yellow(),
            OperationKind::Delete => "delete".red(),
        };
        lines.push(format!(
            "{:<4} {:<8} {:<20} {:<10} {}",
            i + 1,
            kind,
            op.collection,
            op.payload.id().unwrap_or("-"),
            op.enqueued_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        ));
    }

    lines.join("\n")
}

/// Format a cached snapshot
pub fn format_cache_entry_pretty(entry: &CacheEntry) -> String {
    let rows = match &entry.data {
        Value::Array(items) => format!("{} rows", items.len()),
        _ => "1 value".to_string(),
    };

    let mut output = format!("{} ({rows})\n", entry.collection.as_str().bold());
    output.push_str(&format!(
        "  {}: {} ({})\n",
        "Synced".dimmed(),
        entry.synced_at.format("%Y-%m-%d %H:%M:%S"),
        format_age(entry.synced_at)
    ));
    output.push_str(&"─".repeat(60));
    output.push('\n');
    output.push_str(&serde_json::to_string_pretty(&entry.data).unwrap_or_default());
    output
}

/// Format the list of cached collections
pub fn format_cached_collections_pretty(
    collections: &[String],
    last_sync: Option<DateTime<Utc>>,
) -> String {
    if collections.is_empty() {
        return "Cache is empty.".to_string();
    }

    let mut output = format!("Cached Tables ({})\n", collections.len());
    for name in collections {
        output.push_str(&format!("  {name}\n"));
    }
    if let Some(at) = last_sync {
        output.push_str(&format!("{} {}", "Last sync:".dimmed(), format_age(at)));
    }
    output
}

/// Format the team summary shown after an export
pub fn format_summary_pretty(kind: ExportKind, summary: &TeamSummary) -> String {
    let mut lines = Vec::new();

    lines.push(kind.title().bold().to_string());
    lines.push("─".repeat(50));
    lines.push(format!(
        "  Matches: {}   Record: {}-{}   Win rate: {:.0}%",
        summary.matches_played,
        summary.wins.to_string().green(),
        summary.losses.to_string().red(),
        summary.win_rate * 100.0
    ));

    if !summary.players.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "  {:<22} {:>3} {:>6} {:>6} {:>6} {:>6} {:>6}",
            "Player", "MP", "Kills", "Aces", "Blocks", "Digs", "Pts"
        ));
        for p in &summary.players {
            lines.push(format!(
                "  {:<22} {:>3} {:>6.1} {:>6.1} {:>6.1} {:>6.1} {:>6.1}",
                p.player, p.matches, p.kills, p.aces, p.blocks, p.digs, p.points
            ));
        }
    }

    lines.join("\n")
}
