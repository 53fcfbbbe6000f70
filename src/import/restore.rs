use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::task;
use tracing::{error, info};

use crate::archive::{ArchiveError, ArchiveFormat, ArchiveReader};
use crate::assets::AssetStore;
use crate::error::codes;
use crate::repo::{self, LibraryCounts};
use crate::AppError;

use super::execute::{import_document, ImportError};
use super::relink::relink_assets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePhase {
    Idle,
    Validating,
    Wiping,
    Importing,
    Relinking,
    Done,
    Failed,
}

impl RestorePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestorePhase::Idle => "idle",
            RestorePhase::Validating => "validating",
            RestorePhase::Wiping => "wiping",
            RestorePhase::Importing => "importing",
            RestorePhase::Relinking => "relinking",
            RestorePhase::Done => "done",
            RestorePhase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RestoreEvent {
    Phase {
        phase: RestorePhase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

pub type RestoreObserver = Arc<dyn Fn(RestoreEvent) + Send + Sync + 'static>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub phase: RestorePhase,
    pub source: String,
    pub format: ArchiveFormat,
    pub counts: LibraryCounts,
    pub assets_relinked: usize,
    pub assets_skipped: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("invalid archive: {0}")]
    InvalidArchive(#[source] ArchiveError),
    #[error("import failed: {0}")]
    Import(#[from] ImportError),
    #[error("restore i/o failed: {0}")]
    Io(#[from] io::Error),
}

impl RestoreError {
    pub fn is_invalid_archive(&self) -> bool {
        matches!(self, RestoreError::InvalidArchive(_))
    }
}

impl From<ArchiveError> for RestoreError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Io(io) => RestoreError::Io(io),
            other => RestoreError::InvalidArchive(other),
        }
    }
}

impl From<RestoreError> for AppError {
    fn from(err: RestoreError) -> Self {
        let message = err.to_string();
        match err {
            RestoreError::InvalidArchive(inner) => {
                AppError::new(codes::RESTORE_INVALID_ARCHIVE, message).with_cause(inner)
            }
            RestoreError::Import(inner) => {
                AppError::new(codes::RESTORE_IMPORT_FAILED, message).with_cause(inner)
            }
            RestoreError::Io(inner) => AppError::new(codes::RESTORE_IO, message).with_cause(inner),
        }
    }
}

struct Progress {
    phase: RestorePhase,
    observer: Option<RestoreObserver>,
}

impl Progress {
    fn enter(&mut self, phase: RestorePhase, message: Option<String>) {
        self.phase = phase;
        info!(
            target: "readshelf",
            event = "restore_phase",
            phase = phase.as_str(),
            message = message.as_deref().unwrap_or("")
        );
        if let Some(callback) = &self.observer {
            callback(RestoreEvent::Phase { phase, message });
        }
    }

    fn fail(&mut self, err: RestoreError) -> RestoreError {
        error!(target: "readshelf", event = "restore_failed", error = %err);
        self.enter(RestorePhase::Failed, Some(err.to_string()));
        err
    }
}

/// Replace the library with the contents of the archive at `path`.
///
/// The archive is read and validated before anything is touched. Wiping and
/// importing share one transaction, so a failed import leaves the previous
/// library in place. Assets are relinked after commit; asset problems are
/// counted, never raised.
pub async fn restore_archive(
    pool: &SqlitePool,
    store: &AssetStore,
    path: &Path,
    observer: Option<RestoreObserver>,
) -> Result<RestoreReport, RestoreError> {
    let start = Instant::now();
    let mut progress = Progress {
        phase: RestorePhase::Idle,
        observer,
    };

    progress.enter(RestorePhase::Validating, None);
    let source: PathBuf = path.to_path_buf();
    let opened = task::spawn_blocking(move || ArchiveReader::open(&source))
        .await
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()));
    let reader = match opened {
        Ok(Ok(reader)) => reader,
        Ok(Err(err)) => return Err(progress.fail(err.into())),
        Err(err) => return Err(progress.fail(err.into())),
    };

    progress.enter(RestorePhase::Wiping, None);
    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(err) => return Err(progress.fail(ImportError::from(err).into())),
    };
    let wiped = async {
        repo::delete_all_notes(&mut *tx).await?;
        repo::delete_all_sessions(&mut *tx).await?;
        repo::delete_all_books(&mut *tx).await?;
        Ok::<_, sqlx::Error>(())
    }
    .await;
    if let Err(err) = wiped {
        return Err(progress.fail(ImportError::from(err).into()));
    }

    progress.enter(RestorePhase::Importing, None);
    let outcome = match import_document(&mut *tx, reader.document()).await {
        Ok(outcome) => outcome,
        Err(err) => {
            // Dropping the transaction rolls back the wipe as well.
            drop(tx);
            return Err(progress.fail(err.into()));
        }
    };
    if let Err(err) = tx.commit().await {
        return Err(progress.fail(ImportError::from(err).into()));
    }

    let format = reader.format();
    let mut assets_relinked = 0;
    let mut assets_skipped = 0;
    if format == ArchiveFormat::Zip {
        progress.enter(RestorePhase::Relinking, None);
        let summary = relink_assets(pool, reader, &outcome.id_map, store).await;
        assets_relinked = summary.relinked;
        assets_skipped = summary.skipped;
    }

    progress.enter(RestorePhase::Done, None);
    let report = RestoreReport {
        phase: progress.phase,
        source: path.display().to_string(),
        format,
        counts: outcome.counts,
        assets_relinked,
        assets_skipped,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        target: "readshelf",
        event = "restore_completed",
        books = report.counts.books,
        sessions = report.counts.sessions,
        notes = report.counts.notes,
        assets_relinked,
        assets_skipped,
        duration_ms = report.duration_ms
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_pool;
    use crate::export::document::LibraryDocument;
    use crate::models::{Book, ReadingSession};
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn recorder() -> (RestoreObserver, Arc<Mutex<Vec<RestorePhase>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: RestoreObserver = Arc::new(move |event| {
            let RestoreEvent::Phase { phase, .. } = event;
            sink.lock().unwrap().push(phase);
        });
        (observer, seen)
    }

    #[tokio::test]
    async fn plain_archive_skips_relinking() {
        let dir = tempdir().unwrap();
        let mut book = Book::new("Plain");
        book.id = 5;
        let doc = LibraryDocument::new(vec![book], vec![ReadingSession::new(5, 1)], Vec::new());
        let path = dir.path().join("manual_backup_2026-10-18T08-00-00-000Z.json");
        fs::write(&path, doc.to_json().unwrap()).unwrap();

        let pool = open_memory_pool().await.unwrap();
        let (observer, seen) = recorder();
        let report = restore_archive(&pool, &AssetStore::new(dir.path()), &path, Some(observer))
            .await
            .unwrap();

        assert_eq!(report.phase, RestorePhase::Done);
        assert_eq!(report.format, ArchiveFormat::Json);
        assert_eq!(report.counts.sessions, 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                RestorePhase::Validating,
                RestorePhase::Wiping,
                RestorePhase::Importing,
                RestorePhase::Done
            ]
        );
    }

    #[tokio::test]
    async fn invalid_archive_fails_from_validating() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        fs::write(&path, b"not a zip archive at all, not even close").unwrap();

        let pool = open_memory_pool().await.unwrap();
        let (observer, seen) = recorder();
        let err = restore_archive(&pool, &AssetStore::new(dir.path()), &path, Some(observer))
            .await
            .unwrap_err();
        assert!(err.is_invalid_archive());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![RestorePhase::Validating, RestorePhase::Failed]
        );
        assert!(AppError::from(err).is(codes::RESTORE_INVALID_ARCHIVE));
    }

    #[tokio::test]
    async fn missing_file_is_io_not_invalid() {
        let dir = tempdir().unwrap();
        let pool = open_memory_pool().await.unwrap();
        let err = restore_archive(
            &pool,
            &AssetStore::new(dir.path()),
            &dir.path().join("nope.zip"),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RestoreError::Io(_)));
    }
}
