use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::features::export::{ExportKind, ReportFormat};
use crate::features::sync::OperationKind;

#[derive(Parser)]
#[command(name = "rallysync")]
#[command(about = "Offline write queue and cache for a volleyball team backend")]
#[command(long_about = "rallysync - offline sync for a volleyball team backend

Queues inserts, updates and deletes while the backend is unreachable and
replays them in order once it comes back. Keeps the last fetched copy of
each table for offline reads, and exports match statistics as CSV.

QUICK START:
  rallysync enqueue events insert --data '{\"title\":\"Practice\"}'
  rallysync status            Show pending writes and last sync
  rallysync sync              Replay pending writes now
  rallysync watch             Replay automatically whenever the backend is reachable

CONFIGURATION:
  ~/.rallysync/config.yaml, or RALLYSYNC_REMOTE_URL / RALLYSYNC_API_KEY.
  Set RALLYSYNC_LOG=debug for diagnostic logging on stderr.

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Use 'pretty' for human-readable colored output, or 'json' for
    /// machine-readable output suitable for scripting. Defaults to
    /// `general.default_output` from the config file.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show sync status
    ///
    /// Pending writes, last successful sync, and whether the backend is
    /// reachable right now.
    Status,

    /// Queue a write for the backend
    ///
    /// The write is stored locally first. If the backend is reachable it is
    /// replayed straight away.
    ///
    /// # Examples
    ///
    ///   rallysync enqueue events insert --data '{"title":"Practice"}'
    ///   rallysync enqueue events update --id 42 --data '{"title":"Scrimmage"}'
    ///   rallysync enqueue attendance delete --id 7
    Enqueue(EnqueueArgs),

    /// List pending writes in replay order
    List,

    /// Replay pending writes now
    ///
    /// Checks reachability first; does nothing while offline.
    Sync,

    /// Drop every pending write
    Clear {
        /// Required: the dropped writes are never sent
        #[arg(long)]
        force: bool,
    },

    /// Inspect or refresh cached tables
    Cache(CacheArgs),

    /// Export match statistics as CSV or HTML
    ///
    /// Works offline from the cached match_stats table.
    ///
    /// # Examples
    ///
    ///   rallysync export team --from 2024-01-01 --to 2024-06-30
    ///   rallysync export player --player-id p1 --format html
    ///   rallysync export match --match-id 12 --out ./reports
    Export(ExportArgs),

    /// Keep syncing until interrupted
    ///
    /// Probes the backend periodically and replays pending writes every
    /// time it becomes reachable. Stop with Ctrl-C.
    Watch,
}

#[derive(Args)]
pub struct EnqueueArgs {
    /// Target table (events, attendance, teams, ...)
    pub collection: String,

    /// insert, update or delete
    pub kind: OperationKind,

    /// Record id; required for update and delete unless present in --data
    #[arg(long, short = 'i')]
    pub id: Option<String>,

    /// Record fields as a JSON object
    #[arg(long, short = 'd')]
    pub data: Option<String>,
}

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

/// Cache subcommands.
#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show the cached copy of a table, or list cached tables
    Get {
        /// Table name; omit to list what is cached
        collection: Option<String>,
    },

    /// Fetch a table from the backend and cache it
    ///
    /// Falls back to the cached copy when the backend is unreachable.
    Fetch {
        /// Table name
        collection: String,

        /// Columns to select (PostgREST syntax)
        #[arg(long, short = 's')]
        select: Option<String>,

        /// Equality filter as COLUMN=VALUE; repeatable
        #[arg(long = "eq", value_name = "COLUMN=VALUE")]
        filters: Vec<String>,

        /// Sort by this column
        #[arg(long)]
        order: Option<String>,

        /// Sort descending (with --order)
        #[arg(long, requires = "order")]
        desc: bool,

        /// Maximum rows
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Remove every cached table and the last-sync marker
    Clear,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Report kind
    #[arg(value_enum)]
    pub kind: ExportKind,

    /// Player id (player reports)
    #[arg(long)]
    pub player_id: Option<String>,

    /// Match id (match reports)
    #[arg(long)]
    pub match_id: Option<String>,

    /// First match date to include (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last match date to include (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Report file format
    #[arg(long, value_enum, default_value_t = ReportFormat::Csv)]
    pub format: ReportFormat,

    /// Output directory (defaults to ~/.rallysync/exports)
    #[arg(long)]
    pub out: Option<PathBuf>,
}
