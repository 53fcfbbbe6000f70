use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::naming::BackupKind;

pub const FORMAT_VERSION: u32 = 1;

/// Descriptor stored next to the document. Display and diagnostics only; a
/// restore never depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub format_version: u32,
    pub backup_id: String,
    pub kind: BackupKind,
    pub created_at: String,
    pub app_version: String,
    pub asset_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_sha256: Option<String>,
}

impl BackupMetadata {
    pub fn new(kind: BackupKind, created_at: DateTime<Utc>, document: &[u8]) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            backup_id: Uuid::now_v7().to_string(),
            kind,
            created_at: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            asset_count: 0,
            document_sha256: Some(sha256_hex(document)),
        }
    }

    /// True when no digest was recorded or it matches `document`.
    pub fn matches_document(&self, document: &[u8]) -> bool {
        match &self.document_sha256 {
            Some(expected) => expected.eq_ignore_ascii_case(&sha256_hex(document)),
            None => true,
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
