use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rallysync::cli::args::Cli;
use rallysync::cli::commands;

/// Environment variable holding the log filter, e.g. `rallysync=debug`.
const LOG_ENV: &str = "RALLYSYNC_LOG";

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let output = commands::execute(cli).await?;

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
