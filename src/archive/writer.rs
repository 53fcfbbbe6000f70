use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::manifest::BackupMetadata;
use super::naming::BackupKind;
use super::{ArchiveError, ASSET_DIR, DOCUMENT_ENTRY, METADATA_ENTRY};

/// A local cover image to embed, keyed by the exporting database's book id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveAsset {
    pub book_id: i64,
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct WrittenArchive {
    pub metadata: BackupMetadata,
    pub assets_skipped: usize,
    pub size_bytes: u64,
}

/// Entry name for an embedded asset: `covers/<bookId>_<originalFilename>`.
pub fn asset_entry_name(book_id: i64, file_name: &str) -> String {
    format!("{ASSET_DIR}{book_id}_{file_name}")
}

/// Write a zip archive at `dest`. Assets that cannot be read are logged and
/// left out; the metadata records only the ones actually embedded.
pub fn write_archive(
    dest: &Path,
    document: &str,
    assets: &[ArchiveAsset],
    kind: BackupKind,
    created_at: DateTime<Utc>,
) -> Result<WrittenArchive, ArchiveError> {
    let file = File::create(dest)?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.start_file(DOCUMENT_ENTRY, options)?;
    writer.write_all(document.as_bytes())?;

    let mut embedded = 0_u64;
    let mut skipped = 0_usize;
    for asset in assets {
        let Some(file_name) = asset
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
        else {
            skipped += 1;
            continue;
        };
        let bytes = match fs::read(&asset.path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(
                    target: "readshelf",
                    event = "export_asset_unreadable",
                    book_id = asset.book_id,
                    path = %asset.path.display(),
                    error = %err
                );
                skipped += 1;
                continue;
            }
        };
        writer.start_file(asset_entry_name(asset.book_id, &file_name), options)?;
        writer.write_all(&bytes)?;
        embedded += 1;
    }

    let mut metadata = BackupMetadata::new(kind, created_at, document.as_bytes());
    metadata.asset_count = embedded;
    writer.start_file(METADATA_ENTRY, options)?;
    serde_json::to_writer_pretty(&mut writer, &metadata)?;

    let file = writer.finish()?;
    file.sync_all()?;
    let size_bytes = file.metadata().map(|m| m.len()).unwrap_or(0);

    Ok(WrittenArchive {
        metadata,
        assets_skipped: skipped,
        size_bytes,
    })
}

/// Data-only variant: the file content is the document itself.
pub fn write_plain(dest: &Path, document: &str) -> Result<u64, ArchiveError> {
    let mut file = File::create(dest)?;
    file.write_all(document.as_bytes())?;
    file.sync_all()?;
    Ok(document.len() as u64)
}
