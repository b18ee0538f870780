use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod format;

use cli::{Cli, Commands};
use commands::{MeasureOptions, cmd_history, cmd_measure, cmd_profile, cmd_scan};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(balanca_store::default_db_path);

    match cli.command {
        Commands::Scan {
            class,
            timeout,
            format,
        } => cmd_scan(class.into(), timeout, format, cli.quiet).await,
        Commands::Measure {
            class,
            device,
            user,
            height,
            timeout,
            calibration,
            measuring,
            yes,
        } => {
            cmd_measure(
                &db_path,
                MeasureOptions {
                    class: class.into(),
                    device,
                    user,
                    height,
                    scan_timeout: timeout,
                    calibration,
                    measuring,
                    auto_confirm: yes,
                    quiet: cli.quiet,
                },
            )
            .await
        }
        Commands::History {
            user,
            kind,
            limit,
            format,
        } => cmd_history(&db_path, &user, kind, limit, format),
        Commands::Profile { action } => cmd_profile(&db_path, action),
    }
}
