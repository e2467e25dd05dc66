//! Repository path normalization.

/// Normalize a repository path to its absolute canonical form.
///
/// Adds a leading `/`, collapses repeated separators, drops `.` segments and
/// trailing separators. `..` segments are kept as-is; they are the remote's to
/// interpret.
///
/// ```
/// use revview_core::path::normalize_path;
///
/// assert_eq!(normalize_path("trunk//lib/"), "/trunk/lib");
/// assert_eq!(normalize_path(""), "/");
/// ```
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    let mut normalized = String::with_capacity(path.len() + 1);
    normalized.push('/');
    normalized.push_str(&segments.join("/"));
    normalized
}

/// Parent of a normalized path, `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Final segment of a normalized path; empty for the root.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}
