//! Row-level CRUD for the library tables. Every function takes a generic
//! executor so callers can pass either the pool or an open transaction.

use serde::Serialize;
use sqlx::{Executor, Sqlite};

use crate::models::{Book, Note, ReadingSession};

pub async fn insert_book<'e, E>(exec: E, book: &Book) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query(
        "INSERT INTO books (title, author, status, rating, current_page, total_pages, \
         current_chapter, total_chapters, series_name, series_index, asset_ref, \
         started_at, finished_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&book.title)
    .bind(&book.author)
    .bind(book.status.as_str())
    .bind(book.rating)
    .bind(book.current_page)
    .bind(book.total_pages)
    .bind(book.current_chapter)
    .bind(book.total_chapters)
    .bind(&book.series_name)
    .bind(book.series_index)
    .bind(&book.asset_ref)
    .bind(book.started_at)
    .bind(book.finished_at)
    .bind(book.created_at)
    .bind(book.updated_at)
    .execute(exec)
    .await?;
    Ok(res.last_insert_rowid())
}

pub async fn insert_session<'e, E>(exec: E, session: &ReadingSession) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query(
        "INSERT INTO reading_sessions (book_id, started_at, ended_at, duration_seconds, \
         start_page, end_page, pages_read, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(session.book_id)
    .bind(session.started_at)
    .bind(session.ended_at)
    .bind(session.duration_seconds)
    .bind(session.start_page)
    .bind(session.end_page)
    .bind(session.pages_read)
    .bind(session.created_at)
    .execute(exec)
    .await?;
    Ok(res.last_insert_rowid())
}

pub async fn insert_note<'e, E>(exec: E, note: &Note) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query(
        "INSERT INTO notes (book_id, content, page_number, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(note.book_id)
    .bind(&note.content)
    .bind(note.page_number)
    .bind(note.created_at)
    .bind(note.updated_at)
    .execute(exec)
    .await?;
    Ok(res.last_insert_rowid())
}

pub async fn get_all_books<'e, E>(exec: E) -> Result<Vec<Book>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT * FROM books ORDER BY id")
        .fetch_all(exec)
        .await?;
    rows.iter().map(Book::from_row).collect()
}

pub async fn list_sessions<'e, E>(exec: E) -> Result<Vec<ReadingSession>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT * FROM reading_sessions ORDER BY id")
        .fetch_all(exec)
        .await?;
    rows.iter().map(ReadingSession::from_row).collect()
}

pub async fn list_notes<'e, E>(exec: E) -> Result<Vec<Note>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT * FROM notes ORDER BY id")
        .fetch_all(exec)
        .await?;
    rows.iter().map(Note::from_row).collect()
}

/// Point a book's `asset_ref` somewhere else. Leaves every other column,
/// `updated_at` included, untouched. Returns false when the row does not exist.
pub async fn update_book_asset_ref<'e, E>(
    exec: E,
    book_id: i64,
    asset_ref: &str,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query("UPDATE books SET asset_ref = ? WHERE id = ?")
        .bind(asset_ref)
        .bind(book_id)
        .execute(exec)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn delete_all_notes<'e, E>(exec: E) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query("DELETE FROM notes")
        .execute(exec)
        .await?
        .rows_affected())
}

pub async fn delete_all_sessions<'e, E>(exec: E) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query("DELETE FROM reading_sessions")
        .execute(exec)
        .await?
        .rows_affected())
}

pub async fn delete_all_books<'e, E>(exec: E) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(sqlx::query("DELETE FROM books")
        .execute(exec)
        .await?
        .rows_affected())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryCounts {
    pub books: u64,
    pub sessions: u64,
    pub notes: u64,
}

pub async fn count_rows<'e, E>(exec: E) -> Result<LibraryCounts, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let (books, sessions, notes): (i64, i64, i64) = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM books), \
                (SELECT COUNT(*) FROM reading_sessions), \
                (SELECT COUNT(*) FROM notes)",
    )
    .fetch_one(exec)
    .await?;
    Ok(LibraryCounts {
        books: books.max(0) as u64,
        sessions: sessions.max(0) as u64,
        notes: notes.max(0) as u64,
    })
}
