use std::env;
use std::path::{Path, PathBuf};

use chrono::Duration;

use crate::{AppError, AppResult};

pub const APP_DIR_NAME: &str = "readshelf";
pub const DB_FILE_NAME: &str = "readshelf.sqlite3";
pub const BACKUP_DIR_NAME: &str = "backups";
pub const ASSET_DIR_NAME: &str = "covers";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const LOG_DIR_NAME: &str = "logs";

pub const FAKE_APPDATA_ENV: &str = "READSHELF_FAKE_APPDATA";
const KEEP_ENV: &str = "READSHELF_BACKUP_KEEP";
const INTERVAL_ENV: &str = "READSHELF_AUTO_BACKUP_HOURS";

pub const DEFAULT_RETENTION_COUNT: usize = 7;
const HARD_MAX_RETENTION_COUNT: usize = 50;
pub const DEFAULT_AUTO_INTERVAL_HOURS: i64 = 24;
const HARD_MAX_AUTO_INTERVAL_HOURS: i64 = 720;

/// Filesystem locations used by one installation.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub archive_dir: PathBuf,
    pub asset_dir: PathBuf,
    pub settings_path: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            db_path: data_dir.join(DB_FILE_NAME),
            archive_dir: data_dir.join(BACKUP_DIR_NAME),
            asset_dir: data_dir.join(ASSET_DIR_NAME),
            settings_path: data_dir.join(SETTINGS_FILE_NAME),
            log_dir: data_dir.join(LOG_DIR_NAME),
            data_dir,
        }
    }

    /// Resolve paths from `READSHELF_FAKE_APPDATA` or the platform data dir.
    pub fn resolve() -> AppResult<Self> {
        if let Ok(fake) = env::var(FAKE_APPDATA_ENV) {
            return Ok(Self::new(fake));
        }
        let base = dirs::data_dir()
            .or_else(|| env::current_dir().ok())
            .ok_or_else(|| {
                AppError::new(
                    "CONFIG/NO_DATA_DIR",
                    "Failed to resolve application data directory",
                )
            })?;
        Ok(Self::new(base.join(APP_DIR_NAME)))
    }

    pub fn ensure_dirs(&self) -> AppResult<()> {
        for dir in [&self.data_dir, &self.archive_dir, &self.asset_dir] {
            ensure_dir(dir)?;
        }
        Ok(())
    }
}

fn ensure_dir(dir: &Path) -> AppResult<()> {
    std::fs::create_dir_all(dir).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "create_app_dir")
            .with_context("path", dir.display().to_string())
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    /// Number of newest archives kept after pruning.
    pub retention_count: usize,
    /// Minimum time between automatic backups.
    pub auto_interval: Duration,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            retention_count: DEFAULT_RETENTION_COUNT,
            auto_interval: Duration::hours(DEFAULT_AUTO_INTERVAL_HOURS),
        }
    }
}

impl BackupConfig {
    pub fn load() -> Self {
        let retention_count = env::var(KEEP_ENV)
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .map(|value| value.min(HARD_MAX_RETENTION_COUNT))
            .unwrap_or(DEFAULT_RETENTION_COUNT);

        let hours = env::var(INTERVAL_ENV)
            .ok()
            .and_then(|value| value.parse::<i64>().ok())
            .filter(|value| *value > 0)
            .map(|value| value.min(HARD_MAX_AUTO_INTERVAL_HOURS))
            .unwrap_or(DEFAULT_AUTO_INTERVAL_HOURS);

        Self {
            retention_count,
            auto_interval: Duration::hours(hours),
        }
    }

    pub fn with_retention_count(mut self, count: usize) -> Self {
        self.retention_count = count.max(1);
        self
    }
}
