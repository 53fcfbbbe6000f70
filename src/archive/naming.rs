use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

const NAME_INFIX: &str = "_backup_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Manual,
    Auto,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Manual => "manual",
            BackupKind::Auto => "auto",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(BackupKind::Manual),
            "auto" => Ok(BackupKind::Auto),
            other => Err(format!("unknown backup kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Zip,
    Json,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Json => "json",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "zip" => Some(ArchiveFormat::Zip),
            "json" => Some(ArchiveFormat::Json),
            _ => None,
        }
    }
}

/// Parsed form of `<kind>_backup_<timestamp>.<ext>`. The timestamp is an
/// RFC 3339 UTC instant with millisecond precision where `:` and `.` are
/// replaced by `-`, e.g. `auto_backup_2026-10-18T08-33-12-345Z.zip`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    pub kind: BackupKind,
    pub format: ArchiveFormat,
    pub created_at: DateTime<Utc>,
    file_name: String,
}

impl ArchiveName {
    pub fn new(kind: BackupKind, format: ArchiveFormat, created_at: DateTime<Utc>) -> Self {
        let file_name = format!(
            "{}{NAME_INFIX}{}.{}",
            kind.as_str(),
            encode_timestamp(&created_at),
            format.extension()
        );
        // Re-parse so `created_at` carries exactly the precision the name encodes.
        let created_at = decode_timestamp(&encode_timestamp(&created_at)).unwrap_or(created_at);
        Self {
            kind,
            format,
            created_at,
            file_name,
        }
    }

    /// Returns `None` for anything that is not an archive name.
    pub fn parse(file_name: &str) -> Option<Self> {
        let (stem, ext) = file_name.rsplit_once('.')?;
        let format = ArchiveFormat::from_extension(ext)?;
        let (kind, stamp) = stem.split_once(NAME_INFIX)?;
        let kind = kind.parse::<BackupKind>().ok()?;
        let created_at = decode_timestamp(stamp)?;
        Some(Self {
            kind,
            format,
            created_at,
            file_name: file_name.to_string(),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Newest first; equal timestamps fall back to the file name so the order
    /// is total.
    pub fn newest_first(a: &ArchiveName, b: &ArchiveName) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.file_name.cmp(&a.file_name))
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name)
    }
}

pub fn encode_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

fn decode_timestamp(stamp: &str) -> Option<DateTime<Utc>> {
    // 2026-10-18T08-33-12-345Z
    let bytes = stamp.as_bytes();
    if bytes.len() != 24
        || !stamp.is_ascii()
        || bytes[10] != b'T'
        || bytes[13] != b'-'
        || bytes[16] != b'-'
        || bytes[19] != b'-'
        || bytes[23] != b'Z'
    {
        return None;
    }
    let restored = format!(
        "{}:{}:{}.{}",
        &stamp[..13],
        &stamp[14..16],
        &stamp[17..19],
        &stamp[20..]
    );
    DateTime::parse_from_rfc3339(&restored)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
