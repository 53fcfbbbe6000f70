use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::models::{Book, Note, ReadingSession};
use crate::repo::{self, LibraryCounts};

use super::SnapshotError;

pub const DOCUMENT_VERSION: u32 = 1;

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

/// Full interchange document for the library tables. Rows keep the primary
/// keys of the database that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub exported_at: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub sessions: Vec<ReadingSession>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),
    #[error("unsupported document version {found} (expected {DOCUMENT_VERSION})")]
    UnsupportedVersion { found: u32 },
}

impl LibraryDocument {
    pub fn new(books: Vec<Book>, sessions: Vec<ReadingSession>, notes: Vec<Note>) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            exported_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            books,
            sessions,
            notes,
        }
    }

    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let doc: LibraryDocument = serde_json::from_str(text)?;
        if doc.version != DOCUMENT_VERSION {
            return Err(DocumentError::UnsupportedVersion { found: doc.version });
        }
        Ok(doc)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn counts(&self) -> LibraryCounts {
        LibraryCounts {
            books: self.books.len() as u64,
            sessions: self.sessions.len() as u64,
            notes: self.notes.len() as u64,
        }
    }
}

/// Read every book, session and note inside one read transaction.
pub async fn snapshot_document(pool: &SqlitePool) -> Result<LibraryDocument, SnapshotError> {
    let mut tx = pool.begin().await?;
    let books = repo::get_all_books(&mut *tx).await?;
    let sessions = repo::list_sessions(&mut *tx).await?;
    let notes = repo::list_notes(&mut *tx).await?;
    tx.commit().await?;
    Ok(LibraryDocument::new(books, sessions, notes))
}

/// Serialize the whole library to the interchange document.
pub async fn export_all_data(pool: &SqlitePool) -> Result<String, SnapshotError> {
    let doc = snapshot_document(pool).await?;
    Ok(doc.to_json()?)
}
