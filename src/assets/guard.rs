use unicode_normalization::UnicodeNormalization;

use crate::error::codes::{ASSET_FILENAME_INVALID, ASSET_NAME_TOO_LONG};
use crate::AppError;

// The asset store is one flat directory, so every name written into it must be
// a single safe path component.
const MAX_COMPONENT_BYTES: usize = 255;

/// NFC-normalize `raw` and check that it is usable as a file name inside the
/// asset store.
pub fn normalize_file_name(raw: &str) -> Result<String, AppError> {
    if raw.is_empty() {
        return Err(AppError::new(
            ASSET_FILENAME_INVALID,
            "Asset filename cannot be empty.",
        ));
    }
    if raw == "." || raw == ".." {
        return Err(AppError::new(
            ASSET_FILENAME_INVALID,
            "Asset filename may not be a traversal segment.",
        )
        .with_context("name", raw));
    }
    let name = raw.nfc().collect::<String>();
    validate_component(&name).map_err(|err| err.with_context("name", raw))?;
    Ok(name)
}

fn validate_component(segment: &str) -> Result<(), AppError> {
    if segment.len() > MAX_COMPONENT_BYTES {
        return Err(AppError::new(
            ASSET_NAME_TOO_LONG,
            "Asset filename is too long.",
        ));
    }
    if segment.trim_end_matches([' ', '.']).len() != segment.len() {
        return Err(AppError::new(
            ASSET_FILENAME_INVALID,
            "Asset names may not end with spaces or dots.",
        ));
    }
    if segment.chars().any(|c| {
        c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
    }) {
        return Err(AppError::new(
            ASSET_FILENAME_INVALID,
            "Asset names contain unsupported characters.",
        ));
    }
    if is_reserved_windows_name(segment) {
        return Err(AppError::new(
            ASSET_FILENAME_INVALID,
            "Asset names may not use reserved Windows names.",
        ));
    }
    Ok(())
}

fn is_reserved_windows_name(segment: &str) -> bool {
    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let stem = segment.split('.').next().unwrap_or(segment);
    RESERVED.iter().any(|name| stem.eq_ignore_ascii_case(name))
}
