use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::time::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    #[default]
    WantToRead,
    Reading,
    Finished,
    Abandoned,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::WantToRead => "want_to_read",
            BookStatus::Reading => "reading",
            BookStatus::Finished => "finished",
            BookStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "want_to_read" => Ok(BookStatus::WantToRead),
            "reading" => Ok(BookStatus::Reading),
            "finished" => Ok(BookStatus::Finished),
            "abandoned" => Ok(BookStatus::Abandoned),
            other => Err(format!("unknown book status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub status: BookStatus,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub current_page: i64,
    #[serde(default)]
    pub total_pages: i64,
    #[serde(default)]
    pub current_chapter: i64,
    #[serde(default)]
    pub total_chapters: i64,
    #[serde(default)]
    pub series_name: Option<String>,
    #[serde(default)]
    pub series_index: Option<f64>,
    /// Empty, a remote URL, or a path into the local asset store.
    #[serde(default)]
    pub asset_ref: String,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub finished_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Book {
    pub fn new(title: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: 0,
            title: title.into(),
            author: String::new(),
            status: BookStatus::default(),
            rating: None,
            current_page: 0,
            total_pages: 0,
            current_chapter: 0,
            total_chapters: 0,
            series_name: None,
            series_index: None,
            asset_ref: String::new(),
            started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_asset_ref(mut self, asset_ref: impl Into<String>) -> Self {
        self.asset_ref = asset_ref.into();
        self
    }

    pub fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status.parse::<BookStatus>().map_err(|err| {
            sqlx::Error::ColumnDecode {
                index: "status".into(),
                source: err.into(),
            }
        })?;
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            status,
            rating: row.try_get("rating")?,
            current_page: row.try_get("current_page")?,
            total_pages: row.try_get("total_pages")?,
            current_chapter: row.try_get("current_chapter")?,
            total_chapters: row.try_get("total_chapters")?,
            series_name: row.try_get("series_name")?,
            series_index: row.try_get("series_index")?,
            asset_ref: row.try_get("asset_ref")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingSession {
    pub id: i64,
    pub book_id: i64,
    pub started_at: i64,
    #[serde(default)]
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub duration_seconds: i64,
    #[serde(default)]
    pub start_page: i64,
    #[serde(default)]
    pub end_page: i64,
    #[serde(default)]
    pub pages_read: i64,
    pub created_at: i64,
}

impl ReadingSession {
    pub fn new(book_id: i64, started_at: i64) -> Self {
        Self {
            id: 0,
            book_id,
            started_at,
            ended_at: None,
            duration_seconds: 0,
            start_page: 0,
            end_page: 0,
            pages_read: 0,
            created_at: started_at,
        }
    }

    pub fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            book_id: row.try_get("book_id")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            duration_seconds: row.try_get("duration_seconds")?,
            start_page: row.try_get("start_page")?,
            end_page: row.try_get("end_page")?,
            pages_read: row.try_get("pages_read")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: i64,
    pub book_id: i64,
    pub content: String,
    #[serde(default)]
    pub page_number: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Note {
    pub fn new(book_id: i64, content: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: 0,
            book_id,
            content: content.into(),
            page_number: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            book_id: row.try_get("book_id")?,
            content: row.try_get("content")?,
            page_number: row.try_get("page_number")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
