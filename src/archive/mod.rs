//! Portable backup container. A zip archive holds the library document, a
//! metadata record and one entry per cover image; the plain variant is just
//! the document as a `.json` file.

use std::io;

use thiserror::Error;
use zip::result::ZipError;

use crate::error::codes;
use crate::AppError;

pub mod manifest;
pub mod naming;
pub mod reader;
pub mod writer;

pub use manifest::BackupMetadata;
pub use naming::{ArchiveFormat, ArchiveName, BackupKind};
pub use reader::{ArchiveReader, AssetEntry};
pub use writer::{write_archive, write_plain, ArchiveAsset, WrittenArchive};

pub const DOCUMENT_ENTRY: &str = "library.json";
pub const METADATA_ENTRY: &str = "metadata.json";
pub const ASSET_DIR: &str = "covers/";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid archive: {reason}")]
    InvalidArchive { reason: String },
    #[error("archive i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("zip container error: {0}")]
    Zip(#[source] ZipError),
    #[error("failed to encode archive entry: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ArchiveError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ArchiveError::InvalidArchive {
            reason: reason.into(),
        }
    }

    pub fn is_invalid_archive(&self) -> bool {
        matches!(self, ArchiveError::InvalidArchive { .. })
    }
}

impl From<ZipError> for ArchiveError {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(io) => ArchiveError::Io(io),
            other => ArchiveError::Zip(other),
        }
    }
}

impl From<ArchiveError> for AppError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::InvalidArchive { reason } => {
                AppError::new(codes::ARCHIVE_INVALID, "The archive is not a valid backup.")
                    .with_context("reason", reason)
            }
            ArchiveError::Io(io) => AppError::new(codes::ARCHIVE_IO, "Archive i/o failed.")
                .with_cause(io),
            ArchiveError::Zip(zip) => AppError::from(zip),
            ArchiveError::Encode(json) => {
                AppError::new(codes::ARCHIVE_ENCODE, "Failed to encode archive entry.")
                    .with_cause(json)
            }
        }
    }
}
