//! Chronograph maintenance CLI
//!
//! Operator tooling for one data directory: health checks, snapshots,
//! restore, corruption recovery and entity inspection.
//!
//! # Usage
//! ```bash
//! chronograph [--config chronograph.toml] [--data-dir ./data] [--verbose] <command>
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use chronograph_core::{BackupManager, EngineConfig, HealthReport, RecoveryOutcome, Store};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

/// Chronograph - temporal graph store maintenance
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Data directory (overrides the configuration file)
    #[arg(short, long, value_name = "DIR", env = "CHRONOGRAPH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every history file
    Health {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage snapshots
    #[command(subcommand)]
    Backup(BackupCommand),

    /// Restore the newest backup that validates cleanly if the data is corrupt
    Recover,

    /// Print an entity version
    Show {
        /// Entity id
        id: String,

        /// Look up an edge instead of a node
        #[arg(long)]
        edge: bool,

        /// Version active at this RFC 3339 instant instead of the current one
        #[arg(long, value_parser = parse_instant)]
        at: Option<DateTime<Utc>>,

        /// Print every version
        #[arg(long, conflicts_with = "at")]
        history: bool,
    },

    /// Index counts
    Stats {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum BackupCommand {
    /// Snapshot the data directory now
    Create,

    /// List snapshots, newest first
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Replace live data with a snapshot
    Restore {
        /// Snapshot name under the backup directory, or a path
        backup: String,
    },
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        backup_dir = %config.backup_dir().display(),
        durability = ?config.durability,
        "configuration loaded"
    );
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Health { json } => {
            let report = chronograph_core::validate_directory(&config.data_dir)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_health(&report);
            }
            if !report.is_healthy() {
                bail!("{} invalid file(s)", report.invalid);
            }
        }
        Commands::Backup(command) => run_backup(&config, command)?,
        Commands::Recover => {
            let manager = BackupManager::new(&config);
            match manager.recover_from_corruption()? {
                RecoveryOutcome::Healthy => {
                    println!("{} data directory is healthy", "OK".green().bold());
                }
                RecoveryOutcome::Recovered {
                    backup, attempts, ..
                } => {
                    println!(
                        "{} restored {} after {} attempt(s)",
                        "RECOVERED".yellow().bold(),
                        backup.name,
                        attempts
                    );
                }
            }
        }
        Commands::Show {
            id,
            edge,
            at,
            history,
        } => {
            let store = Store::open(&config)?;
            let value = match (*edge, *history, at) {
                (false, true, _) => serde_json::to_value(store.node_history(id)?)?,
                (true, true, _) => serde_json::to_value(store.edge_history(id)?)?,
                (false, false, Some(t)) => serde_json::to_value(store.get_node_at_time(id, *t)?)?,
                (true, false, Some(t)) => serde_json::to_value(store.get_edge_at_time(id, *t)?)?,
                (false, false, None) => serde_json::to_value(store.get_node(id)?)?,
                (true, false, None) => serde_json::to_value(store.get_edge(id)?)?,
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Stats { json } => {
            let store = Store::open(&config)?;
            let stats = store.stats();
            if *json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("DATA DIR: {}", store.data_dir().display());
                println!(
                    "NODES:    {} ({} versions, {} current)",
                    stats.node_histories, stats.node_versions, stats.current_nodes
                );
                println!(
                    "EDGES:    {} ({} versions, {} current)",
                    stats.edge_histories, stats.edge_versions, stats.current_edges
                );
            }
        }
    }

    Ok(())
}

fn run_backup(config: &EngineConfig, command: &BackupCommand) -> anyhow::Result<()> {
    let manager = BackupManager::new(config);
    match command {
        BackupCommand::Create => {
            let info = manager.create_backup()?;
            println!(
                "{} {} ({} files, {} bytes)",
                "CREATED".green().bold(),
                info.path.display(),
                info.metadata.file_count,
                info.metadata.size_bytes
            );
        }
        BackupCommand::List { json } => {
            let backups = manager.list_backups()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&backups)?);
            } else if backups.is_empty() {
                println!("No backups in {}", manager.backup_dir().display());
            } else {
                for backup in &backups {
                    println!(
                        "{}  {}  {:>6} files  {:>10} bytes",
                        backup.name.bold(),
                        backup.metadata.timestamp.to_rfc3339(),
                        backup.metadata.file_count,
                        backup.metadata.size_bytes
                    );
                }
            }
        }
        BackupCommand::Restore { backup } => {
            let path = manager.resolve(backup)?;
            manager.restore_from(&path)?;
            let report = chronograph_core::validate_directory(manager.data_dir())?;
            println!("{} {}", "RESTORED".green().bold(), path.display());
            print_health(&report);
        }
    }
    Ok(())
}

fn print_health(report: &HealthReport) {
    let status = if report.is_healthy() {
        "HEALTHY".green().bold()
    } else {
        "CORRUPT".red().bold()
    };
    println!(
        "{}  {} files, {} valid, {} invalid, {} warning(s)",
        status, report.total, report.valid, report.invalid, report.warnings
    );
    for file in &report.reports {
        for issue in &file.errors {
            println!("  {} {}: {}", "error".red(), file.path.display(), issue);
        }
        for issue in &file.warnings {
            println!("  {} {}: {}", "warn".yellow(), file.path.display(), issue);
        }
    }
}
