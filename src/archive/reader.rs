use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::warn;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::export::document::LibraryDocument;

use super::manifest::BackupMetadata;
use super::naming::ArchiveFormat;
use super::{ArchiveError, ASSET_DIR, DOCUMENT_ENTRY, METADATA_ENTRY};

// Declared entry sizes come from the archive itself and are not trusted.
const MAX_PREALLOC_BYTES: usize = 8 * 1024 * 1024;

/// An embedded asset, enumerated but not yet extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    /// Name inside the asset folder, i.e. `<oldBookId>_<originalFilename>`.
    pub name: String,
    index: usize,
}

/// An opened and validated archive. Opening reads and parses the document, so
/// a reader that exists always holds a usable document.
pub struct ArchiveReader {
    path: PathBuf,
    format: ArchiveFormat,
    text: String,
    document: LibraryDocument,
    metadata: Option<BackupMetadata>,
    assets: Vec<AssetEntry>,
    zip: Option<ZipArchive<File>>,
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("assets", &self.assets.len())
            .finish()
    }
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        match detect_format(path) {
            ArchiveFormat::Json => Self::open_plain(path),
            ArchiveFormat::Zip => Self::open_zip(path),
        }
    }

    fn open_plain(path: &Path) -> Result<Self, ArchiveError> {
        let bytes = fs::read(path)?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ArchiveError::invalid("document is not valid UTF-8"))?;
        let document = parse_document(&text)?;
        Ok(Self {
            path: path.to_path_buf(),
            format: ArchiveFormat::Json,
            text,
            document,
            metadata: None,
            assets: Vec::new(),
            zip: None,
        })
    }

    fn open_zip(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        let mut zip = ZipArchive::new(file).map_err(|err| match err {
            ZipError::Io(io) => ArchiveError::Io(io),
            other => ArchiveError::invalid(format!("not a zip archive: {other}")),
        })?;

        let text = read_entry_text(&mut zip, DOCUMENT_ENTRY)?
            .ok_or_else(|| ArchiveError::invalid(format!("missing {DOCUMENT_ENTRY}")))?;
        let document = parse_document(&text)?;

        let metadata = read_metadata_entry(&mut zip, path);
        if let Some(meta) = &metadata {
            if !meta.matches_document(text.as_bytes()) {
                warn!(
                    target: "readshelf",
                    event = "archive_document_digest_mismatch",
                    path = %path.display(),
                    backup_id = %meta.backup_id
                );
            }
        }

        let mut assets = Vec::new();
        for index in 0..zip.len() {
            let entry = match zip.by_index(index) {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(
                        target: "readshelf",
                        event = "archive_entry_unreadable",
                        index,
                        error = %err
                    );
                    continue;
                }
            };
            if entry.is_dir() {
                continue;
            }
            if let Some(name) = entry.name().strip_prefix(ASSET_DIR) {
                if !name.is_empty() {
                    assets.push(AssetEntry {
                        name: name.to_string(),
                        index,
                    });
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            format: ArchiveFormat::Zip,
            text,
            document,
            metadata,
            assets,
            zip: Some(zip),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// The document exactly as stored in the archive.
    pub fn document_text(&self) -> &str {
        &self.text
    }

    pub fn document(&self) -> &LibraryDocument {
        &self.document
    }

    pub fn metadata(&self) -> Option<&BackupMetadata> {
        self.metadata.as_ref()
    }

    pub fn assets(&self) -> &[AssetEntry] {
        &self.assets
    }

    pub fn read_asset(&mut self, entry: &AssetEntry) -> Result<Vec<u8>, ArchiveError> {
        let zip = self
            .zip
            .as_mut()
            .ok_or_else(|| ArchiveError::invalid("plain archives carry no assets"))?;
        let mut file = zip.by_index(entry.index)?;
        let mut bytes = Vec::with_capacity(prealloc_hint(file.size()));
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

fn prealloc_hint(declared: u64) -> usize {
    usize::try_from(declared)
        .unwrap_or(MAX_PREALLOC_BYTES)
        .min(MAX_PREALLOC_BYTES)
}

/// Read only the metadata record of a zip archive. Any failure yields `None`.
pub fn read_metadata(path: &Path) -> Option<BackupMetadata> {
    let file = File::open(path).ok()?;
    let mut zip = ZipArchive::new(file).ok()?;
    read_metadata_entry(&mut zip, path)
}

fn detect_format(path: &Path) -> ArchiveFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => ArchiveFormat::Json,
        _ => ArchiveFormat::Zip,
    }
}

fn parse_document(text: &str) -> Result<LibraryDocument, ArchiveError> {
    LibraryDocument::parse(text).map_err(|err| ArchiveError::invalid(err.to_string()))
}

fn read_entry_text(
    zip: &mut ZipArchive<File>,
    name: &str,
) -> Result<Option<String>, ArchiveError> {
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    let text = String::from_utf8(bytes)
        .map_err(|_| ArchiveError::invalid(format!("{name} is not valid UTF-8")))?;
    Ok(Some(text))
}

fn read_metadata_entry(zip: &mut ZipArchive<File>, path: &Path) -> Option<BackupMetadata> {
    let text = match read_entry_text(zip, METADATA_ENTRY) {
        Ok(Some(text)) => text,
        Ok(None) => return None,
        Err(err) => {
            warn!(
                target: "readshelf",
                event = "archive_metadata_unreadable",
                path = %path.display(),
                error = %err
            );
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(meta) => Some(meta),
        Err(err) => {
            warn!(
                target: "readshelf",
                event = "archive_metadata_invalid",
                path = %path.display(),
                error = %err
            );
            None
        }
    }
}
