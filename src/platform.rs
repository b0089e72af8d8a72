//! Platform name format
//!
//! Maps repository names to names that are safe on a regular filesystem and
//! back. Namespaced names (`jcr:content`) become `_jcr_content`, a plain name
//! with a leading underscore gets it doubled, and characters that are illegal
//! in file names are percent-escaped.

use crate::path;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// ASCII characters that cannot appear in a file name on common platforms
const ESCAPED: &AsciiSet = &CONTROLS
    .add(b'\\')
    .add(b'/')
    .add(b':')
    .add(b'*')
    .add(b'?')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'|')
    .add(b'%');

/// Convert a single repository name into its platform name
pub fn platform_name(repository_name: &str) -> String {
    let (prefix, local) = match repository_name.split_once(':') {
        Some((prefix, local)) if !prefix.is_empty() && !prefix.contains('_') => {
            (Some(prefix), local)
        }
        _ => (None, repository_name),
    };

    let mut out = String::with_capacity(repository_name.len() + 2);
    match prefix {
        Some(prefix) => {
            out.push('_');
            out.push_str(prefix);
            out.push('_');
        }
        None if local.starts_with('_') => out.push('_'),
        None => {}
    }
    // non-ASCII characters are legal in file names and stay as they are
    let mut buf = [0u8; 4];
    for c in local.chars() {
        if c.is_ascii() {
            out.extend(utf8_percent_encode(c.encode_utf8(&mut buf), ESCAPED));
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert a single platform name back into its repository name
pub fn repository_name(platform_name: &str) -> String {
    let (prefix, rest) = if let Some(rest) = platform_name.strip_prefix("__") {
        (None, format!("_{}", rest))
    } else if let Some(rest) = platform_name.strip_prefix('_') {
        match rest.split_once('_') {
            Some((prefix, local)) if !prefix.is_empty() => {
                (Some(prefix.to_string()), local.to_string())
            }
            _ => (None, platform_name.to_string()),
        }
    } else {
        (None, platform_name.to_string())
    };

    let local = unescape(&rest);
    match prefix {
        Some(prefix) => format!("{}:{}", prefix, local),
        None => local,
    }
}

/// Convert a repository path segment by segment into a platform path
pub fn platform_path(repository_path: &str) -> String {
    let mut out = String::new();
    for segment in path::segments(repository_path) {
        out.push('/');
        out.push_str(&platform_name(segment));
    }
    if out.is_empty() && repository_path.starts_with('/') {
        out.push('/');
    }
    out
}

/// Convert a platform path segment by segment into a repository path
pub fn repository_path(platform_path: &str) -> String {
    let mut out = String::new();
    for segment in path::segments(platform_path) {
        out.push('/');
        out.push_str(&repository_name(segment));
    }
    if out.is_empty() && platform_path.starts_with('/') {
        out.push('/');
    }
    out
}

/// Convert a relative repository path (no leading slash) into a relative platform path
pub fn platform_relative(relative: &str) -> String {
    path::segments(relative)
        .map(platform_name)
        .collect::<Vec<_>>()
        .join("/")
}

fn unescape(name: &str) -> String {
    percent_decode_str(name).decode_utf8_lossy().into_owned()
}
