use std::fs;

use serde::Serialize;
use tracing::{info, warn};

use super::store::ArchiveStore;
use crate::AppResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub kept: usize,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

/// Keep the `keep` newest archives by embedded timestamp and delete the rest.
/// Manual and automatic archives share one window. A delete that fails is
/// logged and reported, never raised.
pub fn prune(store: &ArchiveStore, keep: usize) -> AppResult<PruneReport> {
    let archives = store.list()?;
    let mut report = PruneReport {
        kept: archives.len().min(keep),
        ..PruneReport::default()
    };

    for archive in archives.into_iter().skip(keep) {
        let name = archive.name.file_name().to_string();
        match fs::remove_file(&archive.path) {
            Ok(()) => report.removed.push(name),
            Err(err) => {
                warn!(
                    target: "readshelf",
                    event = "retention_remove_failed",
                    archive = %name,
                    error = %err
                );
                report.failed.push(name);
            }
        }
    }

    if !report.removed.is_empty() {
        info!(
            target: "readshelf",
            event = "retention_pruned",
            kept = report.kept,
            removed = report.removed.len()
        );
    }
    Ok(report)
}
