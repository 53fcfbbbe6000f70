//! Asset relinking. This is the only place that knows an embedded asset is
//! named `<oldBookId>_<originalFilename>`.

use std::path::PathBuf;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::task;
use tracing::{debug, warn};

use crate::archive::ArchiveReader;
use crate::assets::AssetStore;
use crate::repo;

use super::execute::IdMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelinkSummary {
    pub relinked: usize,
    pub skipped: usize,
}

/// Split `"<id>_<filename>"`. Returns `None` when the prefix is missing, not
/// an integer, or nothing follows it.
pub fn parse_asset_name(name: &str) -> Option<(i64, &str)> {
    let (prefix, rest) = name.split_once('_')?;
    if prefix.is_empty() || rest.is_empty() {
        return None;
    }
    if !prefix
        .strip_prefix('-')
        .unwrap_or(prefix)
        .chars()
        .all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let id = prefix.parse::<i64>().ok()?;
    Some((id, rest))
}

/// An asset already written to the store, waiting for its book row.
#[derive(Debug)]
struct PendingLink {
    asset: String,
    old_id: i64,
    new_id: i64,
    dest: PathBuf,
}

/// Extract every asset of `reader` into `store` and point the re-keyed book
/// at it. Each asset is handled on its own: one that cannot be attributed,
/// read, written or linked is logged and counted as skipped.
///
/// Zip decompression and the store writes run on the blocking pool; only the
/// row updates run on the async worker.
pub async fn relink_assets(
    pool: &SqlitePool,
    reader: ArchiveReader,
    id_map: &IdMap,
    store: &AssetStore,
) -> RelinkSummary {
    let total = reader.assets().len();
    let ids = id_map.clone();
    let assets = store.clone();
    let (pending, mut summary) =
        match task::spawn_blocking(move || extract_assets(reader, &ids, &assets)).await {
            Ok(extracted) => extracted,
            Err(err) => {
                warn!(
                    target: "readshelf",
                    event = "relink_extract_aborted",
                    assets = total,
                    error = %err
                );
                return RelinkSummary {
                    relinked: 0,
                    skipped: total,
                };
            }
        };

    for link in pending {
        let asset_ref = link.dest.to_string_lossy().into_owned();
        match repo::update_book_asset_ref(pool, link.new_id, &asset_ref).await {
            Ok(true) => {
                debug!(
                    target: "readshelf",
                    event = "relink_asset_linked",
                    old_book_id = link.old_id,
                    new_book_id = link.new_id,
                    path = %link.dest.display()
                );
                summary.relinked += 1;
            }
            Ok(false) => {
                warn!(
                    target: "readshelf",
                    event = "relink_asset_skipped",
                    asset = %link.asset,
                    new_book_id = link.new_id,
                    reason = "book_row_missing"
                );
                summary.skipped += 1;
            }
            Err(err) => {
                warn!(
                    target: "readshelf",
                    event = "relink_asset_skipped",
                    asset = %link.asset,
                    new_book_id = link.new_id,
                    reason = "update_failed",
                    error = %err
                );
                summary.skipped += 1;
            }
        }
    }

    summary
}

fn extract_assets(
    mut reader: ArchiveReader,
    id_map: &IdMap,
    store: &AssetStore,
) -> (Vec<PendingLink>, RelinkSummary) {
    let mut summary = RelinkSummary::default();
    let mut pending = Vec::new();
    let entries = reader.assets().to_vec();

    for entry in &entries {
        let Some((old_id, file_name)) = parse_asset_name(&entry.name) else {
            warn!(
                target: "readshelf",
                event = "relink_asset_skipped",
                asset = %entry.name,
                reason = "unattributable_name"
            );
            summary.skipped += 1;
            continue;
        };
        let Some(new_id) = id_map.get(old_id) else {
            warn!(
                target: "readshelf",
                event = "relink_asset_skipped",
                asset = %entry.name,
                old_book_id = old_id,
                reason = "unknown_book"
            );
            summary.skipped += 1;
            continue;
        };

        let bytes = match reader.read_asset(entry) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(
                    target: "readshelf",
                    event = "relink_asset_skipped",
                    asset = %entry.name,
                    old_book_id = old_id,
                    reason = "read_failed",
                    error = %err
                );
                summary.skipped += 1;
                continue;
            }
        };

        match store.write(file_name, &bytes) {
            Ok(dest) => pending.push(PendingLink {
                asset: entry.name.clone(),
                old_id,
                new_id,
                dest,
            }),
            Err(err) => {
                warn!(
                    target: "readshelf",
                    event = "relink_asset_skipped",
                    asset = %entry.name,
                    old_book_id = old_id,
                    reason = "write_failed",
                    error = %err
                );
                summary.skipped += 1;
            }
        }
    }

    (pending, summary)
}
