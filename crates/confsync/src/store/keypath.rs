//! Helpers for `/`-separated key paths.
//!
//! Keys in the store are plain strings; hierarchy is implied by their
//! segments. These helpers follow POSIX path semantics and never touch the
//! filesystem.

/// Returns the shortest path equivalent to `path`, resolving `.` and `..`
/// segments and collapsing repeated separators.
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Joins path elements with `/` and cleans the result. Empty elements are
/// ignored; joining only empty elements yields an empty string.
pub fn join<S: AsRef<str>>(parts: &[S]) -> String {
    let non_empty: Vec<&str> = parts
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| !p.is_empty())
        .collect();

    if non_empty.is_empty() {
        return String::new();
    }

    clean(&non_empty.join("/"))
}

/// Returns the last element of `path`. Trailing slashes are removed first.
pub fn base(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }

    match trimmed.rfind('/') {
        Some(idx) => trimmed[idx + 1..].to_string(),
        None => trimmed.to_string(),
    }
}

/// Returns all but the last element of `path`, cleaned.
pub fn dir(path: &str) -> String {
    let head = match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "",
    };
    clean(head)
}

/// Reports whether `key` is `prefix` itself or lies below it. Siblings that
/// only share a string prefix (`/apple` for `/app`) do not count.
pub fn is_descendant(key: &str, prefix: &str) -> bool {
    has_prefix_terms(&terms(prefix), &terms(key))
}

/// Splits a cleaned path into its segments. The root path is a single empty
/// segment so that every absolute key has it as a prefix.
pub(crate) fn terms(path: &str) -> Vec<String> {
    let cleaned = clean(path);
    if cleaned == "/" {
        return vec![String::new()];
    }
    cleaned.split('/').map(str::to_string).collect()
}

/// Reports whether `test` starts with every segment of `prefix`.
pub(crate) fn has_prefix_terms(prefix: &[String], test: &[String]) -> bool {
    test.len() >= prefix.len() && prefix.iter().zip(test).all(|(a, b)| a == b)
}
