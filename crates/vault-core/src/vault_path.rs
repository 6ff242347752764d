//! Helpers for vault paths (`$/Folder/Sub/file.ext`).
//!
//! Vault paths always use `/` and compare case-insensitively. Inputs from
//! configuration are passed through [`normalize`] once, so every other
//! helper can assume the canonical form.

/// Marker for the vault root.
pub const ROOT: &str = "$";

/// Canonical form: forward slashes, no repeated or trailing separators.
pub fn normalize(path: &str) -> String {
    let replaced = path.trim().replace('\\', "/");
    let parts: Vec<&str> = replaced.split('/').filter(|s| !s.is_empty()).collect();
    parts.join("/")
}

/// Join a folder path and a child name.
pub fn join(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

/// Parent folder of a vault path, or `None` at the root.
pub fn parent(path: &str) -> Option<&str> {
    path.rfind('/').map(|idx| &path[..idx])
}

/// Last segment of a vault path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Split into (folder, name). A path without a separator has an empty folder.
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

pub fn eq_ci(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

pub fn ends_with_ci(haystack: &str, suffix: &str) -> bool {
    haystack.to_lowercase().ends_with(&suffix.to_lowercase())
}

/// Whether `path` is `folder` itself or lies below it.
pub fn is_within(path: &str, folder: &str) -> bool {
    strip_folder(path, folder).is_some()
}

/// Path of `path` relative to `folder`: `Some("")` when equal, `None` when
/// `path` is not inside `folder`.
pub fn strip_folder<'a>(path: &'a str, folder: &str) -> Option<&'a str> {
    let n = folder.len();
    if path.len() < n || !path.is_char_boundary(n) {
        return None;
    }
    if path[..n].to_lowercase() != folder.to_lowercase() {
        return None;
    }
    let rest = &path[n..];
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}

/// Strip the `$` root marker, leaving a relative path (empty at the root).
pub fn strip_root(path: &str) -> &str {
    strip_folder(path, ROOT).unwrap_or(path)
}

/// Lower-cased key for sets and maps keyed by vault path.
pub fn key(path: &str) -> String {
    path.to_lowercase()
}
