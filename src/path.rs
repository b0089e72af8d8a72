//! Repository path normalization and manipulation utilities
//!
//! Repository and view paths are absolute, `/`-separated strings. They are
//! not OS paths, so everything here works on `str` without touching the
//! filesystem.

use crate::error::StorageError;
use unicode_normalization::UnicodeNormalization;

/// Normalize a path string
///
/// This function:
/// 1. Normalizes Unicode to NFC
/// 2. Collapses repeated separators and drops `.` segments
/// 3. Removes trailing slashes (except root)
///
/// Relative paths and `..` segments are rejected.
pub fn normalize(path: &str) -> Result<String, StorageError> {
    let normalized: String = path.nfc().collect();
    if !normalized.starts_with('/') {
        return Err(StorageError::InvalidPath(format!(
            "Path must be absolute: {}",
            path
        )));
    }

    let mut result = String::with_capacity(normalized.len());
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(StorageError::InvalidPath(format!(
                    "Parent segments are not allowed: {}",
                    path
                )))
            }
            _ => {
                result.push('/');
                result.push_str(segment);
            }
        }
    }

    if result.is_empty() {
        result.push('/');
    }
    Ok(result)
}

/// Last segment of a path; empty for the root
pub fn name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Parent of a path; `None` for the root
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" || path.is_empty() {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Join a (possibly multi-segment) relative path onto a base path
pub fn join(base: &str, relative: &str) -> String {
    let relative = relative.trim_matches('/');
    if relative.is_empty() {
        return base.to_string();
    }
    if base == "/" {
        format!("/{}", relative)
    } else {
        format!("{}/{}", base, relative)
    }
}

/// Number of segments below the root
pub fn depth(path: &str) -> usize {
    segments(path).count()
}

/// Iterate over the non-empty segments of a path
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Path of `path` relative to `ancestor`, if `ancestor` is an ancestor-or-self
///
/// Returns `Some("")` when both paths are equal.
pub fn relative_to<'a>(path: &'a str, ancestor: &str) -> Option<&'a str> {
    if ancestor == "/" {
        return path.strip_prefix('/');
    }
    let rest = path.strip_prefix(ancestor)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}

/// Whether `ancestor` is `path` itself or one of its ancestors
pub fn is_ancestor_or_self(ancestor: &str, path: &str) -> bool {
    relative_to(path, ancestor).is_some()
}
