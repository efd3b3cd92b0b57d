//! Backup Engine - command line entry point

use anyhow::{bail, Context, Result};
use backup_engine::executor::history::BackupHistory;
use backup_engine::{utils, BackupEngine, Config, RunSummary};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up a source directory into a destination directory
    Run {
        #[arg(long)]
        source: Option<PathBuf>,

        #[arg(long)]
        dest: Option<PathBuf>,

        /// Modification window in minutes (0 = every file)
        #[arg(long)]
        window: Option<i64>,

        #[arg(long)]
        concurrency: Option<i64>,
    },

    /// Back up an upload session into a ZIP archive
    Session { id: String },

    /// Create an empty upload session and print its id
    NewSession,

    /// List sessions with a finished archive
    List,

    /// Show details of a session's archive
    Info { id: String },

    /// Remove everything stored for a session
    Cleanup { id: String },

    /// Print the run history
    History,

    /// Check that the storage roots are usable
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!("Starting backup-engine v{}", env!("CARGO_PKG_VERSION"));

    config.ensure_dirs()?;
    let engine = BackupEngine::new(config.engine_settings());

    match args.command {
        Command::Run {
            source,
            dest,
            window,
            concurrency,
        } => {
            if let Some(source) = source {
                config.paths.source_dir = Some(source);
            }
            if let Some(dest) = dest {
                config.paths.backup_dir = Some(dest);
            }
            if let Some(window) = window {
                config.backup.modified_minutes = window;
            }
            if let Some(concurrency) = concurrency {
                config.backup.max_concurrency = concurrency;
            }
            config.normalize();

            let run = config.static_run().context(
                "source and destination directories are required \
                 (--source/--dest or paths.source_dir/paths.backup_dir)",
            )?;

            let summary = engine.scan_and_copy(run).await;
            print_json(&engine.status())?;
            report(summary?);
        }
        Command::Session { id } => {
            let summary = engine.run_session(&id).await;
            print_json(&engine.status())?;
            report(summary?);
        }
        Command::NewSession => {
            let id = engine.sessions().create()?;
            println!("{}", id);
        }
        Command::List => {
            for id in engine.sessions().list()? {
                println!("{}", id);
            }
        }
        Command::Info { id } => {
            print_json(&engine.sessions().info(&id)?)?;
        }
        Command::Cleanup { id } => {
            engine.sessions().cleanup(&id)?;
            println!("Session {} removed", id);
        }
        Command::History => {
            let path = BackupHistory::path_in(&engine.settings().backups_root);
            print_json(&BackupHistory::load(&path))?;
        }
        Command::Health => {
            if let Err(e) = engine.sessions().health() {
                bail!("unhealthy: {}", e);
            }
            print_json(&engine.storage_stats()?)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(summary: RunSummary) {
    if let Some(archive) = summary.archive {
        println!("{}", archive.display());
    }
}
