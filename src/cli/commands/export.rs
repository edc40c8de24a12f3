//! Export command implementation.

use chrono::Local;

use crate::cli::args::{ExportArgs, OutputFormat};
use crate::config::Paths;
use crate::error::RallyError;
use crate::features::export::{export_report, ExportOptions, StatLine, TeamSummary};
use crate::features::sync::{collections, Collection, OfflineSync};
use crate::output::{format_summary_pretty, to_json};

/// Fetch match statistics and write a report.
///
/// Uses the cached `match_stats` table when the backend is unreachable.
///
/// # Errors
///
/// Returns an error if a required id is missing, no data is available, or the
/// report cannot be written.
pub async fn export(
    sync: &OfflineSync,
    paths: &Paths,
    args: ExportArgs,
    format: OutputFormat,
) -> Result<String, RallyError> {
    let options = ExportOptions {
        player_id: args.player_id,
        match_id: args.match_id,
        from: args.from,
        to: args.to,
    };
    let query = options.query(args.kind)?;
    let collection = Collection::new(collections::MATCH_STATS)?;

    sync.probe().await;
    let entry = sync.refresh(&collection, &query).await?;
    let lines = options.filter(args.kind, StatLine::parse_rows(&entry.data)?);

    let dir = args.out.unwrap_or_else(|| paths.exports.clone());
    let path = export_report(
        args.kind,
        args.format,
        &lines,
        &dir,
        Local::now().date_naive(),
    )?;
    let summary = TeamSummary::calculate(&lines);

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({
            "kind": args.kind,
            "format": args.format,
            "path": path,
            "rows": lines.len(),
            "summary": summary,
        })),
        OutputFormat::Pretty => Ok(format!(
            "{}\n\nWrote {} row(s) to {}",
            format_summary_pretty(args.kind, &summary),
            lines.len(),
            path.display()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::export::{ExportKind, ReportFormat};
    use crate::features::sync::{ConnectivityMonitor, RetryPolicy, Unconfigured};
    use crate::storage::MemoryStore;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn offline_with_team_snapshot() -> OfflineSync {
        let sync = OfflineSync::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Unconfigured),
            ConnectivityMonitor::new(false),
            RetryPolicy::none(),
        );
        let stat = |player: &str, game: u32, kills: u32| {
            json!({
                "playerId": player,
                "matches": {"id": game, "date": format!("2024-03-0{game}"), "result": "win"},
                "players": {"id": player, "firstName": player},
                "kills": kills
            })
        };
        sync.cache_put(
            &Collection::new(collections::MATCH_STATS).unwrap(),
            json!([stat("p1", 1, 4), stat("p2", 1, 6), stat("p2", 2, 8)]),
        )
        .unwrap();
        sync
    }

    fn args(kind: ExportKind, out: &TempDir) -> ExportArgs {
        ExportArgs {
            kind,
            player_id: None,
            match_id: None,
            from: None,
            to: None,
            format: ReportFormat::Csv,
            out: Some(out.path().to_path_buf()),
        }
    }

    async fn run(sync: &OfflineSync, args: ExportArgs) -> Value {
        let home = TempDir::new().unwrap();
        let paths = Paths::with_root(home.path().join(".rallysync"));
        let output = export(sync, &paths, args, OutputFormat::Json).await.unwrap();
        serde_json::from_str(&output).unwrap()
    }

    #[tokio::test]
    async fn test_offline_player_export_keeps_only_that_player() {
        let sync = offline_with_team_snapshot();
        let out = TempDir::new().unwrap();

        let report = run(
            &sync,
            ExportArgs {
                player_id: Some("p2".to_string()),
                ..args(ExportKind::Player, &out)
            },
        )
        .await;

        assert_eq!(report["rows"], 2);
        let csv = std::fs::read_to_string(report["path"].as_str().unwrap()).unwrap();
        assert_eq!(csv.lines().count(), 3);

        // The snapshot is untouched, so a later team export still sees everyone.
        let team = run(&sync, args(ExportKind::Team, &out)).await;
        assert_eq!(team["rows"], 3);
    }

    #[tokio::test]
    async fn test_offline_match_export_keeps_only_that_match() {
        let sync = offline_with_team_snapshot();
        let out = TempDir::new().unwrap();

        let report = run(
            &sync,
            ExportArgs {
                match_id: Some("2".to_string()),
                format: ReportFormat::Html,
                ..args(ExportKind::Match, &out)
            },
        )
        .await;

        assert_eq!(report["rows"], 1);
        assert_eq!(report["format"], "html");
        let html = std::fs::read_to_string(report["path"].as_str().unwrap()).unwrap();
        assert!(html.contains("<h1>Match Report</h1>"));
        assert!(html.contains("Generated on"));
    }

    #[tokio::test]
    async fn test_offline_export_without_snapshot_fails() {
        let sync = OfflineSync::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Unconfigured),
            ConnectivityMonitor::new(false),
            RetryPolicy::none(),
        );
        let out = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let paths = Paths::with_root(home.path().to_path_buf());

        let err = export(&sync, &paths, args(ExportKind::Team, &out), OutputFormat::Json)
            .await
            .unwrap_err();
        assert!(matches!(err, RallyError::NotFound(_)));
    }
}
