use std::collections::{HashMap, HashSet};

use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::info;

use crate::error::codes;
use crate::export::document::{DocumentError, LibraryDocument};
use crate::repo::{self, LibraryCounts};
use crate::AppError;

/// Old book id (from the document) to the id the destination database
/// assigned during one import. Lives only as long as that import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap(HashMap<i64, i64>);

impl IdMap {
    pub fn insert(&mut self, old_id: i64, new_id: i64) {
        self.0.insert(old_id, new_id);
    }

    pub fn get(&self, old_id: i64) -> Option<i64> {
        self.0.get(&old_id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub id_map: IdMap,
    pub counts: LibraryCounts,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{table} row {row_id} references book {book_id}, which is not in the document")]
    DanglingReference {
        table: &'static str,
        row_id: i64,
        book_id: i64,
    },
    #[error("document contains book id {book_id} more than once")]
    DuplicateBook { book_id: i64 },
    #[error("invalid document: {0}")]
    Document(#[from] DocumentError),
    #[error("database error during import: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ImportError> for AppError {
    fn from(err: ImportError) -> Self {
        let message = err.to_string();
        match err {
            ImportError::DanglingReference {
                table,
                row_id,
                book_id,
            } => AppError::new(codes::IMPORT_DANGLING_REFERENCE, message)
                .with_context("table", table)
                .with_context("row_id", row_id.to_string())
                .with_context("book_id", book_id.to_string()),
            ImportError::DuplicateBook { book_id } => {
                AppError::new(codes::IMPORT_DUPLICATE_BOOK, message)
                    .with_context("book_id", book_id.to_string())
            }
            ImportError::Document(_) => AppError::new(codes::ARCHIVE_INVALID, message),
            ImportError::Database(db) => {
                AppError::new(codes::IMPORT_DATABASE, message).with_cause(db)
            }
        }
    }
}

/// Every session and note must point at a book of the same document.
fn check_references(doc: &LibraryDocument) -> Result<(), ImportError> {
    let mut book_ids = HashSet::with_capacity(doc.books.len());
    for book in &doc.books {
        if !book_ids.insert(book.id) {
            return Err(ImportError::DuplicateBook { book_id: book.id });
        }
    }
    if let Some(session) = doc.sessions.iter().find(|s| !book_ids.contains(&s.book_id)) {
        return Err(ImportError::DanglingReference {
            table: "reading_sessions",
            row_id: session.id,
            book_id: session.book_id,
        });
    }
    if let Some(note) = doc.notes.iter().find(|n| !book_ids.contains(&n.book_id)) {
        return Err(ImportError::DanglingReference {
            table: "notes",
            row_id: note.id,
            book_id: note.book_id,
        });
    }
    Ok(())
}

/// Insert the document's rows on `conn`, books first, rewriting every
/// `book_id` through the id map. The caller owns the transaction; on error
/// nothing returned here may be used.
pub async fn import_document(
    conn: &mut SqliteConnection,
    doc: &LibraryDocument,
) -> Result<ImportOutcome, ImportError> {
    check_references(doc)?;

    let mut id_map = IdMap::default();
    for book in &doc.books {
        let new_id = repo::insert_book(&mut *conn, book).await?;
        id_map.insert(book.id, new_id);
    }

    for session in &doc.sessions {
        let mut row = session.clone();
        row.book_id = id_map.get(session.book_id).ok_or(ImportError::DanglingReference {
            table: "reading_sessions",
            row_id: session.id,
            book_id: session.book_id,
        })?;
        repo::insert_session(&mut *conn, &row).await?;
    }

    for note in &doc.notes {
        let mut row = note.clone();
        row.book_id = id_map.get(note.book_id).ok_or(ImportError::DanglingReference {
            table: "notes",
            row_id: note.id,
            book_id: note.book_id,
        })?;
        repo::insert_note(&mut *conn, &row).await?;
    }

    Ok(ImportOutcome {
        id_map,
        counts: doc.counts(),
    })
}

/// Parse `text` and add its rows to the database in one transaction.
pub async fn import_data(pool: &SqlitePool, text: &str) -> Result<ImportOutcome, ImportError> {
    let doc = LibraryDocument::parse(text)?;
    let mut tx = pool.begin().await?;
    let outcome = import_document(&mut *tx, &doc).await?;
    tx.commit().await?;
    info!(
        target: "readshelf",
        event = "import_applied",
        books = outcome.counts.books,
        sessions = outcome.counts.sessions,
        notes = outcome.counts.notes
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_pool;
    use crate::models::{Book, Note, ReadingSession};

    fn doc_with_ids() -> LibraryDocument {
        let mut a = Book::new("A");
        a.id = 10;
        let mut b = Book::new("B");
        b.id = 20;
        let mut s = ReadingSession::new(20, 1_000);
        s.id = 1;
        let mut n = Note::new(10, "note");
        n.id = 1;
        LibraryDocument::new(vec![a, b], vec![s], vec![n])
    }

    #[tokio::test]
    async fn rewrites_foreign_keys_through_map() {
        let pool = open_memory_pool().await.unwrap();
        // Occupy the low ids so the new keys differ from the document's.
        repo::insert_book(&pool, &Book::new("existing")).await.unwrap();

        let text = doc_with_ids().to_json().unwrap();
        let outcome = import_data(&pool, &text).await.unwrap();
        assert_eq!(outcome.id_map.len(), 2);
        assert_eq!(outcome.counts.sessions, 1);

        let new_b = outcome.id_map.get(20).unwrap();
        let new_a = outcome.id_map.get(10).unwrap();
        let sessions = repo::list_sessions(&pool).await.unwrap();
        assert_eq!(sessions[0].book_id, new_b);
        let notes = repo::list_notes(&pool).await.unwrap();
        assert_eq!(notes[0].book_id, new_a);
    }

    #[tokio::test]
    async fn dangling_reference_inserts_nothing() {
        let pool = open_memory_pool().await.unwrap();
        let mut doc = doc_with_ids();
        doc.notes[0].book_id = 99;
        let err = import_data(&pool, &doc.to_json().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::DanglingReference { book_id: 99, .. }
        ));
        assert_eq!(repo::count_rows(&pool).await.unwrap(), LibraryCounts::default());
    }

    #[tokio::test]
    async fn duplicate_book_ids_are_rejected() {
        let pool = open_memory_pool().await.unwrap();
        let mut doc = doc_with_ids();
        doc.books[1].id = 10;
        doc.sessions.clear();
        let err = import_data(&pool, &doc.to_json().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::DuplicateBook { book_id: 10 }));
    }
}
