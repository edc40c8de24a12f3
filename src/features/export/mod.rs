//! Match statistics export.
//!
//! Turns `match_stats` rows into CSV or HTML reports and a team summary.

pub mod report;
pub mod stats;

pub use report::{
    export_report, file_name, render_html, write_csv, ExportKind, ExportOptions, ReportFormat,
};
pub use stats::{MatchInfo, PlayerAverages, PlayerInfo, StatLine, TeamSummary};
