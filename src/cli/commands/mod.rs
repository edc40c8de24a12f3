//! Command implementations for rallysync.
//!
//! Every command returns its rendered output; `main` prints it.

mod cache;
mod export;
mod queue;

pub use cache::cache;
pub use export::export;
pub use queue::{clear, enqueue, list, run_sync, status, watch};

use crate::cli::args::{Cli, Commands};
use crate::config::{Config, Paths};
use crate::error::RallyError;
use crate::features::sync::OfflineSync;

/// Load configuration, open the store, and run the parsed command.
///
/// # Errors
///
/// Returns whatever error the command produces.
pub async fn execute(cli: Cli) -> Result<String, RallyError> {
    let paths = Paths::new()?;
    let config = Config::load()?;
    let format = cli.output.unwrap_or(config.general.default_output);
    let mut sync = OfflineSync::open(&config, &paths)?;

    match cli.command {
        Commands::Status => status(&sync, format).await,
        Commands::Enqueue(args) => enqueue(&sync, args, format).await,
        Commands::List => list(&sync, format),
        Commands::Sync => run_sync(&sync, format).await,
        Commands::Clear { force } => clear(&sync, force, format),
        Commands::Cache(args) => cache(&sync, args.command, format).await,
        Commands::Export(args) => export(&sync, &paths, args, format).await,
        Commands::Watch => watch(&mut sync, format).await,
    }
}
