//! Snapshot builder: reads the live database and the asset store and produces
//! the document plus the list of local cover images to embed.

use std::fs;

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, warn};

use crate::archive::ArchiveAsset;
use crate::assets::{AssetRef, AssetStore};
use crate::error::codes;
use crate::AppError;

use self::document::LibraryDocument;

pub mod document;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read library rows: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode library document: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<SnapshotError> for AppError {
    fn from(err: SnapshotError) -> Self {
        let message = err.to_string();
        match err {
            SnapshotError::Database(db) => {
                AppError::new(codes::SNAPSHOT_READ, message).with_cause(db)
            }
            SnapshotError::Encode(json) => {
                AppError::new(codes::ARCHIVE_ENCODE, message).with_cause(json)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub document: LibraryDocument,
    /// Serialized `document`; this exact text goes into the archive.
    pub text: String,
    pub assets: Vec<ArchiveAsset>,
}

impl Snapshot {
    pub fn asset_bytes(&self) -> u64 {
        self.assets
            .iter()
            .fold(0_u64, |acc, a| acc.saturating_add(a.size_bytes))
    }
}

/// Capture the whole library. Books whose local cover is missing or not a
/// regular file keep their row in the document but contribute no asset.
pub async fn build_snapshot(
    pool: &SqlitePool,
    store: &AssetStore,
) -> Result<Snapshot, SnapshotError> {
    let document = document::snapshot_document(pool).await?;
    let text = document.to_json()?;

    let mut assets = Vec::new();
    for book in &document.books {
        let path = match store.classify(&book.asset_ref) {
            AssetRef::Local(path) => path,
            AssetRef::Remote(_) | AssetRef::None => continue,
        };
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => assets.push(ArchiveAsset {
                book_id: book.id,
                path,
                size_bytes: meta.len(),
            }),
            Ok(_) => {
                warn!(
                    target: "readshelf",
                    event = "export_asset_missing",
                    book_id = book.id,
                    path = %path.display(),
                    reason = "not_a_file"
                );
            }
            Err(err) => {
                warn!(
                    target: "readshelf",
                    event = "export_asset_missing",
                    book_id = book.id,
                    path = %path.display(),
                    error = %err
                );
            }
        }
    }

    debug!(
        target: "readshelf",
        event = "snapshot_built",
        books = document.books.len(),
        sessions = document.sessions.len(),
        notes = document.notes.len(),
        assets = assets.len()
    );

    Ok(Snapshot {
        document,
        text,
        assets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_pool;
    use crate::models::Book;
    use crate::repo;
    use tempfile::tempdir;

    #[tokio::test]
    async fn collects_only_existing_local_assets() {
        let dir = tempdir().unwrap();
        let store = AssetStore::new(dir.path());
        fs::write(dir.path().join("present.jpg"), b"img").unwrap();

        let pool = open_memory_pool().await.unwrap();
        let present = repo::insert_book(&pool, &Book::new("Present").with_asset_ref("present.jpg"))
            .await
            .unwrap();
        repo::insert_book(&pool, &Book::new("Missing").with_asset_ref("missing.jpg"))
            .await
            .unwrap();
        repo::insert_book(
            &pool,
            &Book::new("Remote").with_asset_ref("https://covers.example.org/r.jpg"),
        )
        .await
        .unwrap();
        repo::insert_book(&pool, &Book::new("Bare")).await.unwrap();

        let snapshot = build_snapshot(&pool, &store).await.unwrap();
        assert_eq!(snapshot.document.books.len(), 4);
        assert_eq!(snapshot.assets.len(), 1);
        assert_eq!(snapshot.assets[0].book_id, present);
        assert_eq!(snapshot.asset_bytes(), 3);
        assert_eq!(LibraryDocument::parse(&snapshot.text).unwrap(), snapshot.document);
    }
}
