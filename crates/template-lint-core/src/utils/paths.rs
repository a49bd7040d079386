//! Path utilities for resolution and discovery.

use std::path::{Component, Path, PathBuf};

/// Lexically normalizes a path, resolving `.` and `..` without touching the
/// filesystem.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use template_lint_core::utils::paths::normalize_path;
///
/// assert_eq!(normalize_path(Path::new("/a/b/../c/./d")), Path::new("/a/c/d"));
/// ```
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if can_pop {
                    out.pop();
                } else if !matches!(
                    out.components().next_back(),
                    Some(Component::RootDir | Component::Prefix(_))
                ) {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Returns true for module requests that are relative to a directory.
#[must_use]
pub fn is_relative_request(request: &str) -> bool {
    request == "."
        || request == ".."
        || request.starts_with("./")
        || request.starts_with("../")
        || Path::new(request).is_absolute()
}

/// Strips a leading `./` from a glob pattern or path string.
#[must_use]
pub fn strip_dot_prefix(pattern: &str) -> &str {
    let mut pattern = pattern;
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest;
    }
    pattern
}

/// Splits a glob pattern into its leading directories without glob syntax
/// and the remaining pattern.
///
/// # Examples
///
/// ```
/// use template_lint_core::utils::paths::split_glob;
///
/// assert_eq!(split_glob("./src/**/*.html"), ("src", "**/*.html"));
/// assert_eq!(split_glob("../shared/*.html"), ("../shared", "*.html"));
/// assert_eq!(split_glob("/abs/src/*.html"), ("/abs/src", "*.html"));
/// ```
#[must_use]
pub fn split_glob(pattern: &str) -> (&str, &str) {
    let pattern = strip_dot_prefix(pattern);
    let mut end = 0;
    let mut start = 0;
    while let Some(i) = pattern[start..].find('/') {
        if pattern[start..start + i].contains(['*', '?', '[', '{']) {
            break;
        }
        end = start + i;
        start += i + 1;
    }
    if end == 0 && start > 0 && pattern.starts_with('/') {
        return ("/", &pattern[1..]);
    }
    (&pattern[..end], &pattern[start..])
}

/// Returns the leading part of a glob pattern that contains no glob syntax.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use template_lint_core::utils::paths::glob_base;
///
/// assert_eq!(glob_base("src/**/*.html"), Path::new("src"));
/// assert_eq!(glob_base("*.html"), Path::new(""));
/// ```
#[must_use]
pub fn glob_base(pattern: &str) -> PathBuf {
    PathBuf::from(split_glob(pattern).0)
}
