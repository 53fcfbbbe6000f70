//! The local asset store: a flat directory of cover images referenced by
//! `books.asset_ref`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db::write_atomic;
use crate::AppError;

mod guard;

pub use guard::normalize_file_name;

const REMOTE_PREFIXES: [&str; 4] = ["http://", "https://", "data:", "content:"];
const FILE_URI_PREFIX: &str = "file://";

/// What a book's `asset_ref` points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetRef {
    None,
    Remote(String),
    Local(PathBuf),
}

#[derive(Debug, Clone)]
pub struct AssetStore {
    base: Arc<PathBuf>,
}

impl AssetStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Arc::new(base.into()),
        }
    }

    pub fn base(&self) -> &Path {
        self.base.as_path()
    }

    pub fn classify(&self, asset_ref: &str) -> AssetRef {
        let trimmed = asset_ref.trim();
        if trimmed.is_empty() {
            return AssetRef::None;
        }
        let lower = trimmed.to_ascii_lowercase();
        if REMOTE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            return AssetRef::Remote(trimmed.to_string());
        }
        let raw = if lower.starts_with(FILE_URI_PREFIX) {
            &trimmed[FILE_URI_PREFIX.len()..]
        } else {
            trimmed
        };
        let path = Path::new(raw);
        if path.is_absolute() {
            AssetRef::Local(path.to_path_buf())
        } else {
            AssetRef::Local(self.base.join(path))
        }
    }

    /// Write `bytes` into the store under `file_name`, replacing any file of
    /// the same name, and return the final path.
    pub fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, AppError> {
        let name = normalize_file_name(file_name)?;
        fs::create_dir_all(self.base()).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "ensure_asset_dir")
                .with_context("path", self.base().display().to_string())
        })?;
        let dest = self.base.join(&name);
        write_atomic(&dest, bytes).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "write_asset")
                .with_context("path", dest.display().to_string())
        })?;
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn classifies_refs() {
        let store = AssetStore::new("/data/covers");
        assert_eq!(store.classify(""), AssetRef::None);
        assert_eq!(store.classify("   "), AssetRef::None);
        assert_eq!(
            store.classify("https://covers.example.org/1.jpg"),
            AssetRef::Remote("https://covers.example.org/1.jpg".into())
        );
        assert!(matches!(store.classify("data:image/png;base64,AAA"), AssetRef::Remote(_)));
        assert_eq!(
            store.classify("file:///tmp/cover.jpg"),
            AssetRef::Local(PathBuf::from("/tmp/cover.jpg"))
        );
        assert_eq!(
            store.classify("cover.jpg"),
            AssetRef::Local(PathBuf::from("/data/covers/cover.jpg"))
        );
    }

    #[test]
    fn write_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let store = AssetStore::new(dir.path().join("covers"));
        let first = store.write("cover.jpg", b"one").unwrap();
        let second = store.write("cover.jpg", b"two").unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read(&second).unwrap(), b"two");
    }

    #[test]
    fn write_rejects_unsafe_names() {
        let dir = tempdir().unwrap();
        let store = AssetStore::new(dir.path());
        assert!(store.write("../escape.jpg", b"x").is_err());
    }
}
