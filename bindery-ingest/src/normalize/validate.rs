//! Store-path validation

use super::PathError;

/// Maximum store path length in bytes
pub const MAX_PATH_BYTES: usize = 1024;

/// Maximum length of one path segment in bytes
pub const MAX_SEGMENT_BYTES: usize = 255;

const RESERVED_PREFIX: &str = ".well-known/acme-challenge/";

/// Check a rendered store path
///
/// Rejects empty or over-long paths, control characters, absolute paths,
/// empty, `.` and `..` segments, over-long segments and the reserved ACME
/// challenge prefix.
pub fn validate_store_path(path: &str) -> Result<(), PathError> {
    if path.is_empty() {
        return Err(PathError::invalid(path, "path cannot be empty"));
    }
    if path.len() > MAX_PATH_BYTES {
        return Err(PathError::invalid(
            path,
            format!("path exceeds {} bytes ({} bytes)", MAX_PATH_BYTES, path.len()),
        ));
    }
    if path.chars().any(char::is_control) {
        return Err(PathError::invalid(path, "path cannot contain control characters"));
    }
    if path.starts_with('/') {
        return Err(PathError::invalid(path, "path must be relative"));
    }
    if path.starts_with(RESERVED_PREFIX) {
        return Err(PathError::invalid(
            path,
            format!("path cannot start with {}", RESERVED_PREFIX),
        ));
    }

    for segment in path.split('/') {
        match segment {
            "" => return Err(PathError::invalid(path, "path has an empty segment")),
            "." | ".." => {
                return Err(PathError::invalid(path, "path cannot contain . or .. segments"))
            }
            s if s.len() > MAX_SEGMENT_BYTES => {
                return Err(PathError::invalid(
                    path,
                    format!("segment exceeds {} bytes", MAX_SEGMENT_BYTES),
                ))
            }
            _ => {}
        }
    }

    Ok(())
}
