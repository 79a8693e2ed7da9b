// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `file://` URI prefixing for user-visible paths

use std::path::Path;

/// Prefix an absolute path with `file://` for display in errors and hints.
///
/// Idempotent: strings already containing a `://` scheme are returned
/// unchanged, as are relative paths.
///
/// ```
/// use wave_core::file_uri;
/// assert_eq!(file_uri("/a"), "file:///a");
/// assert_eq!(file_uri("file:///a"), "file:///a");
/// assert_eq!(file_uri("./a"), "./a");
/// assert_eq!(file_uri("https://x"), "https://x");
/// ```
pub fn file_uri(path: &str) -> String {
    if path.contains("://") {
        return path.to_string();
    }
    if Path::new(path).is_absolute() {
        format!("file://{}", path)
    } else {
        path.to_string()
    }
}

/// [`file_uri`] for a `Path`, lossy on non-UTF-8 names.
pub fn file_uri_path(path: &Path) -> String {
    file_uri(&path.to_string_lossy())
}

#[cfg(test)]
#[path = "uri_tests.rs"]
mod tests;
