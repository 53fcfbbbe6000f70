#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};

use readshelf_lib::archive::{ArchiveFormat, ArchiveReader, BackupKind};
use readshelf_lib::config::AppPaths;
use readshelf_lib::import::{RestoreEvent, RestoreObserver, RestorePhase};
use readshelf_lib::models::Book;
use readshelf_lib::repo::{self, LibraryCounts};
use sqlx::SqlitePool;
use tempfile::tempdir;

use util::{engine, file_pool, seed_library, COVER_BYTES, REMOTE_COVER};

async fn sessions_by_title(pool: &SqlitePool) -> Vec<(String, i64, i64)> {
    let titles: HashMap<i64, String> = repo::get_all_books(pool)
        .await
        .unwrap()
        .into_iter()
        .map(|b| (b.id, b.title))
        .collect();
    let mut rows: Vec<(String, i64, i64)> = repo::list_sessions(pool)
        .await
        .unwrap()
        .into_iter()
        .map(|s| (titles[&s.book_id].clone(), s.started_at, s.pages_read))
        .collect();
    rows.sort();
    rows
}

async fn book_by_title(pool: &SqlitePool, title: &str) -> Book {
    repo::get_all_books(pool)
        .await
        .unwrap()
        .into_iter()
        .find(|b| b.title == title)
        .unwrap_or_else(|| panic!("book {title} missing"))
}

#[tokio::test]
async fn backup_then_restore_reproduces_library_and_cover() {
    let tmp = tempdir().unwrap();
    let paths = AppPaths::new(tmp.path().join("appdata"));
    let pool = file_pool(&paths).await;
    let engine = engine(&pool, &paths);
    seed_library(&pool, engine.assets()).await;
    let sessions_before = sessions_by_title(&pool).await;
    let local_before = book_by_title(&pool, "Local Cover").await;

    let entry = engine.create_backup(BackupKind::Manual).await.unwrap();
    assert_eq!(entry.format, ArchiveFormat::Zip);
    assert_eq!(entry.asset_count, Some(1));
    assert!(entry.file_name.starts_with("manual_backup_"));

    let reader = ArchiveReader::open(std::path::Path::new(&entry.path)).unwrap();
    assert_eq!(reader.assets().len(), 1);
    assert!(reader.assets()[0].name.ends_with("_cover.jpg"));
    drop(reader);

    // Drift away from the snapshot before restoring it.
    fs::remove_file(paths.asset_dir.join("cover.jpg")).unwrap();
    repo::insert_book(&pool, &Book::new("Added Later")).await.unwrap();

    let phases = Arc::new(Mutex::new(Vec::new()));
    let sink = phases.clone();
    let observer: RestoreObserver = Arc::new(move |event| {
        let RestoreEvent::Phase { phase, .. } = event;
        sink.lock().unwrap().push(phase);
    });

    let report = engine
        .restore(std::path::Path::new(&entry.path), Some(observer))
        .await
        .unwrap();

    assert_eq!(
        report.counts,
        LibraryCounts {
            books: 3,
            sessions: 5,
            notes: 2
        }
    );
    assert_eq!(report.assets_relinked, 1);
    assert_eq!(report.assets_skipped, 0);
    assert_eq!(repo::count_rows(&pool).await.unwrap(), report.counts);
    assert_eq!(
        *phases.lock().unwrap(),
        vec![
            RestorePhase::Validating,
            RestorePhase::Wiping,
            RestorePhase::Importing,
            RestorePhase::Relinking,
            RestorePhase::Done,
        ]
    );

    let local = book_by_title(&pool, "Local Cover").await;
    let restored_cover = paths.asset_dir.join("cover.jpg");
    assert_eq!(local.asset_ref, restored_cover.to_string_lossy());
    assert_eq!(local.updated_at, local_before.updated_at);
    assert_eq!(local.created_at, local_before.created_at);
    assert_eq!(fs::read(&restored_cover).unwrap(), COVER_BYTES);

    assert_eq!(book_by_title(&pool, "Dune").await.asset_ref, REMOTE_COVER);
    assert_eq!(book_by_title(&pool, "No Cover").await.asset_ref, "");
    assert!(repo::get_all_books(&pool)
        .await
        .unwrap()
        .iter()
        .all(|b| b.title != "Added Later"));

    assert_eq!(sessions_by_title(&pool).await, sessions_before);
    pool.close().await;
}

#[tokio::test]
async fn plain_export_restores_rows_without_relinking() {
    let tmp = tempdir().unwrap();
    let paths = AppPaths::new(tmp.path().join("appdata"));
    let pool = file_pool(&paths).await;
    let engine = engine(&pool, &paths);
    seed_library(&pool, engine.assets()).await;

    let entry = engine.export_plain(BackupKind::Manual).await.unwrap();
    assert_eq!(entry.format, ArchiveFormat::Json);
    assert!(entry.file_name.ends_with(".json"));

    repo::delete_all_notes(&pool).await.unwrap();

    let report = engine
        .restore(std::path::Path::new(&entry.path), None)
        .await
        .unwrap();
    assert_eq!(report.format, ArchiveFormat::Json);
    assert_eq!(report.counts.notes, 2);
    assert_eq!(report.assets_relinked, 0);
    assert_eq!(report.assets_skipped, 0);
    pool.close().await;
}

#[tokio::test]
async fn listing_reports_metadata_for_zip_archives() {
    let tmp = tempdir().unwrap();
    let paths = AppPaths::new(tmp.path().join("appdata"));
    let pool = file_pool(&paths).await;
    let engine = engine(&pool, &paths);
    seed_library(&pool, engine.assets()).await;

    let created = engine.create_backup(BackupKind::Auto).await.unwrap();
    let listed = engine.list_backups().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].file_name, created.file_name);
    assert_eq!(listed[0].kind, BackupKind::Auto);
    let metadata = listed[0].metadata.as_ref().expect("metadata present");
    assert_eq!(metadata.asset_count, 1);

    engine.delete_backup(&created.file_name).unwrap();
    assert!(engine.list_backups().unwrap().is_empty());
    assert!(engine.delete_backup(&created.file_name).is_err());
    pool.close().await;
}

#[tokio::test]
async fn restore_into_a_fresh_install_keeps_every_field_but_keys() {
    let tmp = tempdir().unwrap();
    let source_paths = AppPaths::new(tmp.path().join("source"));
    let source_pool = file_pool(&source_paths).await;
    let source = engine(&source_pool, &source_paths);
    seed_library(&source_pool, source.assets()).await;
    let entry = source.create_backup(BackupKind::Manual).await.unwrap();

    let dest_paths = AppPaths::new(tmp.path().join("dest"));
    let dest_pool = file_pool(&dest_paths).await;
    let dest = engine(&dest_pool, &dest_paths);
    // Burn the first ids so the restored rows cannot reuse the source keys.
    for _ in 0..3 {
        repo::insert_book(&dest_pool, &Book::new("Pad")).await.unwrap();
    }
    repo::delete_all_books(&dest_pool).await.unwrap();

    let report = dest
        .restore(std::path::Path::new(&entry.path), None)
        .await
        .unwrap();
    assert_eq!(report.assets_relinked, 1);

    let strip = |mut b: Book| {
        b.id = 0;
        if b.title == "Local Cover" {
            b.asset_ref.clear();
        }
        b
    };
    let mut before: Vec<Book> = repo::get_all_books(&source_pool)
        .await
        .unwrap()
        .into_iter()
        .map(strip)
        .collect();
    let mut after: Vec<Book> = repo::get_all_books(&dest_pool)
        .await
        .unwrap()
        .into_iter()
        .map(strip)
        .collect();
    before.sort_by(|a, b| a.title.cmp(&b.title));
    after.sort_by(|a, b| a.title.cmp(&b.title));
    assert_eq!(after, before);

    let source_ids: Vec<i64> = repo::get_all_books(&source_pool)
        .await
        .unwrap()
        .iter()
        .map(|b| b.id)
        .collect();
    let dest_ids: Vec<i64> = repo::get_all_books(&dest_pool)
        .await
        .unwrap()
        .iter()
        .map(|b| b.id)
        .collect();
    assert!(dest_ids.iter().all(|id| !source_ids.contains(id)));

    assert_eq!(sessions_by_title(&dest_pool).await, sessions_by_title(&source_pool).await);

    let cover = book_by_title(&dest_pool, "Local Cover").await.asset_ref;
    assert!(cover.starts_with(&*dest_paths.asset_dir.to_string_lossy()));
    assert_eq!(fs::read(&cover).unwrap(), COVER_BYTES);

    source_pool.close().await;
    dest_pool.close().await;
}
