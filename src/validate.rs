use std::path::Path;

use crate::error::{Error, Result};

/// Longest file name accepted, in bytes.
pub const MAX_NAME_LEN: usize = 255;

const ILLEGAL_CHARS: [char; 10] = ['/', '\\', '\0', '<', '>', ':', '"', '|', '?', '*'];

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Validate a bare file name, portable across platforms.
pub fn validate_filename(name: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(Error::InvalidFilename {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.is_empty() {
        return reject("name cannot be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return reject("name is longer than 255 bytes");
    }
    if let Some(c) = name.chars().find(|c| ILLEGAL_CHARS.contains(c) || c.is_control()) {
        return reject(&format!("name cannot contain {c:?}"));
    }
    if name == "." || name == ".." {
        return reject("'.' and '..' are reserved");
    }
    if name.starts_with(' ') || name.ends_with(' ') {
        return reject("name cannot start or end with a space");
    }
    if name.ends_with('.') {
        return reject("name cannot end with a dot");
    }
    let upper = name.to_ascii_uppercase();
    let base = upper.split('.').next().unwrap_or("");
    if RESERVED_NAMES.contains(&base) {
        return reject("reserved device name");
    }
    Ok(())
}

/// Check that a source exists, without following a final symlink.
pub fn require_source(source: &Path) -> Result<()> {
    if std::fs::symlink_metadata(source).is_err() {
        return Err(Error::SourceNotFound(source.to_path_buf()));
    }
    Ok(())
}

/// Apply extension preservation: drop any extension on `new_name`, keep the source's.
pub fn preserve_extension(source: &Path, new_name: &str) -> String {
    let stem = Path::new(new_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| new_name.to_string());
    match source.extension() {
        Some(ext) => format!("{stem}.{}", ext.to_string_lossy()),
        None => stem,
    }
}
