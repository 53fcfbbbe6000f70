use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use readshelf_lib::archive::{ArchiveName, BackupKind};
use readshelf_lib::config::{AppPaths, BackupConfig};
use readshelf_lib::db::backup::{BackupEngine, BackupEntry};
use readshelf_lib::db::schedule::AutoBackupScheduler;
use readshelf_lib::import::{RestoreError, RestoreEvent, RestoreObserver};
use readshelf_lib::settings::StoreHandle;
use readshelf_lib::time::SystemClock;

const INVALID_ARCHIVE_EXIT_CODE: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "readshelf", about = "Readshelf library maintenance", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create, inspect and restore library backups.
    #[command(subcommand)]
    Backup(BackupCommand),
}

#[derive(Debug, Subcommand)]
enum BackupCommand {
    /// Snapshot the library and its cover images into a new archive.
    Create {
        /// Label the archive as an automatic backup.
        #[arg(long)]
        auto: bool,
        /// Emit the backup entry as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Write a data-only JSON export into the archive store.
    ExportJson {
        #[arg(long)]
        json: bool,
    },
    /// List archives in the store, newest first.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Replace the library with the contents of an archive.
    Restore {
        /// Archive file name in the store, or a path to an archive.
        archive: String,
        #[arg(long)]
        json: bool,
    },
    /// Delete one archive from the store by file name.
    Delete { name: String },
    /// Apply the retention window to the archive store.
    Prune,
    /// Run the app-background trigger: back up only if one is due.
    Tick,
}

fn main() {
    let cli = Cli::parse();

    let paths = match AppPaths::resolve() {
        Ok(paths) => paths,
        Err(err) => {
            readshelf_lib::init_logging();
            eprintln!("Error: {err}");
            process::exit(1);
        }
    };
    let guard = match readshelf_lib::init_file_logging(&paths.log_dir) {
        Ok(guard) => Some(guard),
        Err(err) => {
            readshelf_lib::init_logging();
            tracing::warn!(target: "readshelf", event = "file_logging_unavailable", error = %err);
            None
        }
    };

    let code = match handle_cli(cli.command, &paths) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            1
        }
    };
    drop(guard);
    process::exit(code);
}

fn handle_cli(command: Commands, paths: &AppPaths) -> Result<i32> {
    match command {
        Commands::Backup(cmd) => handle_backup_command(cmd, paths),
    }
}

fn handle_backup_command(command: BackupCommand, paths: &AppPaths) -> Result<i32> {
    paths.ensure_dirs().context("prepare data directories")?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;

    runtime.block_on(async {
        let pool = readshelf_lib::db::open_sqlite_pool(&paths.db_path).await?;
        let engine = BackupEngine::from_paths(pool.clone(), paths, BackupConfig::load());
        let result = run_backup_command(command, &engine, paths).await;
        pool.close().await;
        result
    })
}

async fn run_backup_command(
    command: BackupCommand,
    engine: &BackupEngine,
    paths: &AppPaths,
) -> Result<i32> {
    match command {
        BackupCommand::Create { auto, json } => {
            let kind = if auto {
                BackupKind::Auto
            } else {
                BackupKind::Manual
            };
            let entry = engine
                .create_backup(kind)
                .await
                .context("create backup")?;
            print_entry(&entry, json)?;
            Ok(0)
        }
        BackupCommand::ExportJson { json } => {
            let entry = engine
                .export_plain(BackupKind::Manual)
                .await
                .context("export library as json")?;
            print_entry(&entry, json)?;
            Ok(0)
        }
        BackupCommand::List { json } => {
            let entries = engine.list_backups().context("list backups")?;
            if json {
                let serialized =
                    serde_json::to_string_pretty(&entries).context("serialize backup list")?;
                println!("{serialized}");
            } else if entries.is_empty() {
                println!("No backups in {}", engine.archives().dir().display());
            } else {
                for entry in &entries {
                    let assets = entry
                        .asset_count
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<48} {:<6} {:>12} bytes  assets {}",
                        entry.file_name,
                        entry.kind.as_str(),
                        entry.size_bytes,
                        assets
                    );
                }
            }
            Ok(0)
        }
        BackupCommand::Restore { archive, json } => {
            let path = resolve_archive_arg(engine, &archive)?;
            let printer: RestoreObserver = Arc::new(move |event| {
                if json {
                    return;
                }
                let RestoreEvent::Phase { phase, message } = event;
                match message {
                    Some(msg) => println!("{:<11} {msg}", phase.as_str()),
                    None => println!("{}", phase.as_str()),
                }
            });
            match engine.restore(&path, Some(printer)).await {
                Ok(report) => {
                    if json {
                        let serialized = serde_json::to_string_pretty(&report)
                            .context("serialize restore report")?;
                        println!("{serialized}");
                    } else {
                        println!(
                            "Restored {} books, {} sessions, {} notes.",
                            report.counts.books, report.counts.sessions, report.counts.notes
                        );
                        if report.assets_relinked > 0 || report.assets_skipped > 0 {
                            println!(
                                "Cover images restored: {} of {}.",
                                report.assets_relinked,
                                report.assets_relinked + report.assets_skipped
                            );
                        }
                    }
                    Ok(0)
                }
                Err(err @ RestoreError::InvalidArchive(_)) => {
                    eprintln!("Error: {err}");
                    Ok(INVALID_ARCHIVE_EXIT_CODE)
                }
                Err(err) => Err(anyhow::Error::new(err).context("restore archive")),
            }
        }
        BackupCommand::Delete { name } => {
            engine.delete_backup(&name).context("delete backup")?;
            println!("Deleted {name}");
            Ok(0)
        }
        BackupCommand::Prune => {
            let report = engine.prune().context("prune archives")?;
            println!(
                "Kept {}, removed {}, failed {}.",
                report.kept,
                report.removed.len(),
                report.failed.len()
            );
            Ok(if report.failed.is_empty() { 0 } else { 1 })
        }
        BackupCommand::Tick => {
            let settings =
                StoreHandle::json_file(&paths.settings_path).context("open settings store")?;
            let scheduler = AutoBackupScheduler::new(
                settings,
                Arc::new(SystemClock),
                engine.config().auto_interval,
            );
            match scheduler
                .on_app_background(engine)
                .await
                .context("run automatic backup")?
            {
                Some(entry) => println!("Automatic backup stored at {}", entry.path),
                None => println!("Automatic backup not due."),
            }
            Ok(0)
        }
    }
}

fn resolve_archive_arg(engine: &BackupEngine, raw: &str) -> Result<PathBuf> {
    if !raw.contains(['/', '\\']) && ArchiveName::parse(raw).is_some() {
        let candidate = engine.archive_path(raw)?;
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Ok(PathBuf::from(raw))
}

fn print_entry(entry: &BackupEntry, emit_json: bool) -> Result<()> {
    if emit_json {
        let payload = json!({
            "entry": entry,
            "path": entry.path,
        });
        let serialized =
            serde_json::to_string_pretty(&payload).context("serialize backup entry payload")?;
        println!("{serialized}");
    } else {
        println!("Backup stored at {}", entry.path);
    }
    Ok(())
}
