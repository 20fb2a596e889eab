//! Full-container format: deterministic tar.gz.
//!
//! - `manifest.json` is the first entry
//! - payload files live under `payloads/`, streamed metadata under `metadata/`
//! - paths are relative POSIX paths without `..`

mod reader;
mod writer;

pub use reader::{read_container, ContainerContents, ContainerEntry};
pub(crate) use reader::read_error;
pub use writer::ContainerWriter;

use crate::error::{ErrorCode, PackageError, PackageResult};
use std::path::{Component, Path};

/// Reserved path of the structural document.
pub const MANIFEST_PATH: &str = "manifest.json";
pub const PAYLOAD_DIR: &str = "payloads";
pub const METADATA_DIR: &str = "metadata";

/// In-container path of a payload file.
pub fn payload_path(file_id: &str, name: Option<&str>) -> String {
    match name.map(sanitize_name).filter(|n| !n.is_empty()) {
        Some(name) => format!("{}/{}_{}", PAYLOAD_DIR, file_id, name),
        None => format!("{}/{}", PAYLOAD_DIR, file_id),
    }
}

/// In-container path of a streamed metadata section.
pub fn metadata_path(section_id: &str, extension: &str) -> String {
    format!("{}/{}.{}", METADATA_DIR, section_id, extension)
}

/// Keep names portable: ASCII alphanumerics plus `.-_`, everything else `_`.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

/// Reject absolute paths, `..` and over-long paths.
pub fn check_entry_path(path: &str, max_len: usize) -> PackageResult<()> {
    if path.len() > max_len {
        return Err(PackageError::validation(
            ErrorCode::ValidationLimit,
            format!("path length {} exceeds limit {}", path.len(), max_len),
        ));
    }
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return Err(PackageError::validation(
            ErrorCode::ValidationPathTraversal,
            format!("invalid entry path '{}'", path),
        ));
    }
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(PackageError::validation(
                    ErrorCode::ValidationPathTraversal,
                    format!("invalid path component in '{}'", path),
                ))
            }
        }
    }
    Ok(())
}

/// Normalize `./a/b` to `a/b` so manifest references and entries compare equal.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect::<Vec<_>>()
        .join("/")
}
