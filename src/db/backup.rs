use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::SecondsFormat;
use fs2::available_space;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::task;
use tracing::{info, warn};

use crate::archive::{
    self, reader::read_metadata, ArchiveFormat, ArchiveName, BackupKind, BackupMetadata,
};
use crate::assets::AssetStore;
use crate::config::{AppPaths, BackupConfig};
use crate::error::codes;
use crate::export;
use crate::import::{restore_archive, RestoreError, RestoreObserver, RestoreReport};
use crate::time::{Clock, SystemClock};
use crate::{AppError, AppResult};

use super::retention::{self, PruneReport};
use super::store::{ArchiveStore, StoredArchive};

const PARTIAL_SUFFIX: &str = ".partial";
const FAKE_FREE_BYTES_ENV: &str = "READSHELF_BACKUP_FAKE_FREE_BYTES";
const REQUIRED_FREE_MULTIPLIER: f64 = 1.1;
const MIN_REQUIRED_FREE_BYTES: u64 = 1_000_000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub file_name: String,
    pub path: String,
    pub kind: BackupKind,
    pub format: ArchiveFormat,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_count: Option<u64>,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BackupMetadata>,
}

impl BackupEntry {
    fn from_stored(stored: StoredArchive, metadata: Option<BackupMetadata>) -> Self {
        BackupEntry {
            file_name: stored.name.file_name().to_string(),
            path: stored.path.to_string_lossy().into_owned(),
            kind: stored.name.kind,
            format: stored.name.format,
            created_at: stored
                .name
                .created_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            asset_count: metadata.as_ref().map(|m| m.asset_count),
            size_bytes: stored.size_bytes,
            metadata,
        }
    }
}

/// Export, restore and archive-store operations over one library. Callers
/// run at most one operation at a time; nothing here locks.
#[derive(Clone)]
pub struct BackupEngine {
    pool: SqlitePool,
    assets: AssetStore,
    archives: ArchiveStore,
    config: BackupConfig,
    clock: Arc<dyn Clock>,
}

impl BackupEngine {
    pub fn new(
        pool: SqlitePool,
        assets: AssetStore,
        archive_dir: impl Into<PathBuf>,
        config: BackupConfig,
    ) -> Self {
        Self {
            pool,
            assets,
            archives: ArchiveStore::new(archive_dir),
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_paths(pool: SqlitePool, paths: &AppPaths, config: BackupConfig) -> Self {
        Self::new(
            pool,
            AssetStore::new(&paths.asset_dir),
            &paths.archive_dir,
            config,
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn archives(&self) -> &ArchiveStore {
        &self.archives
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Snapshot the library into a new zip archive, then prune the store.
    pub async fn create_backup(&self, kind: BackupKind) -> AppResult<BackupEntry> {
        let snapshot = export::build_snapshot(&self.pool, &self.assets)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "build_snapshot"))?;

        self.archives.ensure_dir()?;
        let required = required_free_bytes(
            (snapshot.text.len() as u64).saturating_add(snapshot.asset_bytes()),
        );
        preflight(self.archives.dir(), required)?;

        let name = ArchiveName::new(kind, ArchiveFormat::Zip, self.clock.now());
        let final_path = self.archives.dir().join(name.file_name());
        let partial = partial_path(&final_path);
        let created_at = name.created_at;

        let written = {
            let partial = partial.clone();
            let final_path = final_path.clone();
            task::spawn_blocking(move || -> AppResult<archive::WrittenArchive> {
                let result = archive::write_archive(
                    &partial,
                    &snapshot.text,
                    &snapshot.assets,
                    kind,
                    created_at,
                )
                .map_err(AppError::from)
                .and_then(|written| {
                    fs::rename(&partial, &final_path).map_err(|err| {
                        AppError::from(err)
                            .with_context("operation", "finalize_archive")
                            .with_context("from", partial.display().to_string())
                            .with_context("to", final_path.display().to_string())
                    })?;
                    Ok(written)
                });
                if result.is_err() {
                    let _ = fs::remove_file(&partial);
                }
                result
            })
            .await
            .map_err(|err| {
                AppError::new(codes::BACKUP_TASK, "Backup task panicked")
                    .with_context("error", err.to_string())
            })??
        };

        info!(
            target: "readshelf",
            event = "backup_created",
            kind = kind.as_str(),
            archive = %name,
            assets = written.metadata.asset_count,
            assets_skipped = written.assets_skipped,
            size_bytes = written.size_bytes
        );

        self.prune_after_backup();

        Ok(BackupEntry::from_stored(
            StoredArchive {
                name,
                path: final_path,
                size_bytes: written.size_bytes,
            },
            Some(written.metadata),
        ))
    }

    /// Write a data-only `.json` archive into the store, then prune.
    pub async fn export_plain(&self, kind: BackupKind) -> AppResult<BackupEntry> {
        let text = export::document::export_all_data(&self.pool)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "export_all_data"))?;

        self.archives.ensure_dir()?;
        preflight(self.archives.dir(), required_free_bytes(text.len() as u64))?;

        let name = ArchiveName::new(kind, ArchiveFormat::Json, self.clock.now());
        let final_path = self.archives.dir().join(name.file_name());
        let partial = partial_path(&final_path);

        let written = archive::write_plain(&partial, &text)
            .map_err(AppError::from)
            .and_then(|size| {
                fs::rename(&partial, &final_path).map_err(|err| {
                    AppError::from(err)
                        .with_context("operation", "finalize_archive")
                        .with_context("path", final_path.display().to_string())
                })?;
                Ok(size)
            });
        let size_bytes = match written {
            Ok(size) => size,
            Err(err) => {
                let _ = fs::remove_file(&partial);
                return Err(err);
            }
        };

        info!(
            target: "readshelf",
            event = "backup_created",
            kind = kind.as_str(),
            archive = %name,
            size_bytes
        );

        self.prune_after_backup();

        Ok(BackupEntry::from_stored(
            StoredArchive {
                name,
                path: final_path,
                size_bytes,
            },
            None,
        ))
    }

    pub async fn restore(
        &self,
        path: &Path,
        observer: Option<RestoreObserver>,
    ) -> Result<RestoreReport, RestoreError> {
        restore_archive(&self.pool, &self.assets, path, observer).await
    }

    /// Every archive in the store, newest first. Zip archives carry their
    /// metadata when it can be read.
    pub fn list_backups(&self) -> AppResult<Vec<BackupEntry>> {
        let stored = self.archives.list()?;
        Ok(stored
            .into_iter()
            .map(|archive| {
                let metadata = match archive.name.format {
                    ArchiveFormat::Zip => read_metadata(&archive.path),
                    ArchiveFormat::Json => None,
                };
                BackupEntry::from_stored(archive, metadata)
            })
            .collect())
    }

    pub fn delete_backup(&self, name: &str) -> AppResult<()> {
        self.archives.delete(name)?;
        info!(target: "readshelf", event = "backup_deleted", archive = %name);
        Ok(())
    }

    pub fn archive_path(&self, name: &str) -> AppResult<PathBuf> {
        self.archives.archive_path(name)
    }

    pub fn prune(&self) -> AppResult<PruneReport> {
        retention::prune(&self.archives, self.config.retention_count)
    }

    fn prune_after_backup(&self) {
        if let Err(err) = self.prune() {
            warn!(
                target: "readshelf",
                event = "retention_failed",
                error = %err
            );
        }
    }
}

fn partial_path(final_path: &Path) -> PathBuf {
    let mut s = OsString::from(final_path.as_os_str());
    s.push(PARTIAL_SUFFIX);
    PathBuf::from(s)
}

fn required_free_bytes(payload: u64) -> u64 {
    let padded = (payload as f64 * REQUIRED_FREE_MULTIPLIER).ceil() as u64;
    padded.max(MIN_REQUIRED_FREE_BYTES)
}

fn preflight(dir: &Path, required: u64) -> AppResult<()> {
    let available = free_disk_space(dir)?;
    if available < required {
        return Err(AppError::new(
            codes::BACKUP_LOW_DISK,
            format!("Not enough disk space (need ~{}).", format_bytes(required)),
        )
        .with_context("available_bytes", available.to_string())
        .with_context("required_bytes", required.to_string()));
    }
    Ok(())
}

fn free_disk_space(path: &Path) -> AppResult<u64> {
    if let Ok(fake) = env::var(FAKE_FREE_BYTES_ENV) {
        if let Ok(value) = fake.parse::<u64>() {
            return Ok(value);
        }
    }
    available_space(path).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "available_space")
            .with_context("path", path.display().to_string())
    })
}

fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 MB".to_string();
    }
    let mb = (bytes as f64) / 1_000_000.0;
    if mb < 1.0 {
        "1 MB".to_string()
    } else {
        format!("{:.0} MB", mb.ceil())
    }
}
