use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::archive::ArchiveName;
use crate::error::codes;
use crate::{AppError, AppResult};

/// An archive file found in the store.
#[derive(Debug, Clone)]
pub struct StoredArchive {
    pub name: ArchiveName,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// The flat directory that holds backup archives. Only files whose names
/// parse as archive names are considered part of the store.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    dir: PathBuf,
}

impl ArchiveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> AppResult<()> {
        fs::create_dir_all(&self.dir).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "ensure_archive_dir")
                .with_context("path", self.dir.display().to_string())
        })
    }

    /// Every archive, newest first by the timestamp in its name.
    pub fn list(&self) -> AppResult<Vec<StoredArchive>> {
        let read = match fs::read_dir(&self.dir) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(AppError::from(err)
                    .with_context("operation", "read_archive_dir")
                    .with_context("path", self.dir.display().to_string()))
            }
        };

        let mut out = Vec::new();
        for entry in read {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(target: "readshelf", event = "archive_dir_entry_unreadable", error = %err);
                    continue;
                }
            };
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(ArchiveName::parse) else {
                continue;
            };
            let meta = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            out.push(StoredArchive {
                name,
                path: entry.path(),
                size_bytes: meta.len(),
            });
        }
        out.sort_by(|a, b| ArchiveName::newest_first(&a.name, &b.name));
        Ok(out)
    }

    /// Resolve an archive file name to its path in the store.
    pub fn archive_path(&self, name: &str) -> AppResult<PathBuf> {
        if name.contains(['/', '\\']) || ArchiveName::parse(name).is_none() {
            return Err(AppError::new(
                codes::BACKUP_INVALID_NAME,
                "Not a backup archive name.",
            )
            .with_context("name", name));
        }
        Ok(self.dir.join(name))
    }

    pub fn delete(&self, name: &str) -> AppResult<()> {
        let path = self.archive_path(name)?;
        fs::remove_file(&path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                AppError::new(codes::BACKUP_NOT_FOUND, "Backup not found.").with_context("name", name)
            } else {
                AppError::from(err)
                    .with_context("operation", "delete_archive")
                    .with_context("path", path.display().to_string())
            }
        })
    }
}
