//! Error codes surfaced through [`AppError`](super::AppError).

pub const ARCHIVE_INVALID: &str = "ARCHIVE/INVALID";
pub const ARCHIVE_IO: &str = "ARCHIVE/IO";
pub const ARCHIVE_ZIP: &str = "ARCHIVE/ZIP";
pub const ARCHIVE_ENCODE: &str = "ARCHIVE/ENCODE";

pub const SNAPSHOT_READ: &str = "SNAPSHOT/READ";

pub const IMPORT_DANGLING_REFERENCE: &str = "IMPORT/DANGLING_REFERENCE";
pub const IMPORT_DUPLICATE_BOOK: &str = "IMPORT/DUPLICATE_BOOK";
pub const IMPORT_DATABASE: &str = "IMPORT/DATABASE";

pub const RESTORE_INVALID_ARCHIVE: &str = "RESTORE/INVALID_ARCHIVE";
pub const RESTORE_IMPORT_FAILED: &str = "RESTORE/IMPORT_FAILED";
pub const RESTORE_IO: &str = "RESTORE/IO";

pub const BACKUP_LOW_DISK: &str = "BACKUP/LOW_DISK";
pub const BACKUP_NOT_FOUND: &str = "BACKUP/NOT_FOUND";
pub const BACKUP_INVALID_NAME: &str = "BACKUP/INVALID_NAME";
pub const BACKUP_TASK: &str = "BACKUP/TASK";

pub const ASSET_FILENAME_INVALID: &str = "ASSET/FILENAME_INVALID";
pub const ASSET_NAME_TOO_LONG: &str = "ASSET/NAME_TOO_LONG";

pub const SETTINGS_READ: &str = "SETTINGS/READ";
pub const SETTINGS_WRITE: &str = "SETTINGS/WRITE";
