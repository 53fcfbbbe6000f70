#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;

use readshelf_lib::assets::AssetStore;
use readshelf_lib::config::{AppPaths, BackupConfig};
use readshelf_lib::db::backup::BackupEngine;
use readshelf_lib::models::{Book, Note, ReadingSession};
use readshelf_lib::repo;
use sqlx::SqlitePool;

pub const COVER_BYTES: &[u8] = b"\xff\xd8\xff\xe0 fake jpeg payload";
pub const REMOTE_COVER: &str = "https://covers.example.org/dune.jpg";

pub async fn file_pool(paths: &AppPaths) -> SqlitePool {
    paths.ensure_dirs().expect("create app dirs");
    readshelf_lib::db::open_sqlite_pool(&paths.db_path)
        .await
        .expect("open sqlite pool")
}

pub fn engine(pool: &SqlitePool, paths: &AppPaths) -> BackupEngine {
    BackupEngine::from_paths(pool.clone(), paths, BackupConfig::default())
}

pub struct Seeded {
    pub local_book: i64,
    pub remote_book: i64,
    pub bare_book: i64,
}

/// Three books (local cover, remote cover, no cover), five sessions and two
/// notes.
pub async fn seed_library(pool: &SqlitePool, assets: &AssetStore) -> Seeded {
    fs::create_dir_all(assets.base()).unwrap();
    let cover = assets.base().join("cover.jpg");
    fs::write(&cover, COVER_BYTES).unwrap();

    let local_book = repo::insert_book(
        pool,
        &Book::new("Local Cover").with_asset_ref(cover.to_string_lossy()),
    )
    .await
    .unwrap();
    let remote_book = repo::insert_book(pool, &Book::new("Dune").with_asset_ref(REMOTE_COVER))
        .await
        .unwrap();
    let bare_book = repo::insert_book(pool, &Book::new("No Cover"))
        .await
        .unwrap();

    for (i, book) in [local_book, local_book, remote_book, remote_book, bare_book]
        .into_iter()
        .enumerate()
    {
        let mut session = ReadingSession::new(book, 1_700_000_000_000 + i as i64 * 60_000);
        session.pages_read = 10 + i as i64;
        repo::insert_session(pool, &session).await.unwrap();
    }
    repo::insert_note(pool, &Note::new(local_book, "great opening"))
        .await
        .unwrap();
    repo::insert_note(pool, &Note::new(remote_book, "spice"))
        .await
        .unwrap();

    Seeded {
        local_book,
        remote_book,
        bare_book,
    }
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
