//! Pure path algebra on `/`-separated strings.
//!
//! Nothing here touches the filesystem. Link destinations are computed with
//! these helpers, so their output has to stay byte-for-byte stable between
//! runs.

/// Lexically normalizes a path: collapses repeated slashes, drops `.`
/// segments and folds `x/..` pairs. A leading `..` on a relative path is
/// kept; on an absolute path it is discarded. The empty path becomes `.`.
///
/// Exactly two leading slashes are preserved, as POSIX allows them to carry
/// implementation-defined meaning.
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let leading_slashes = if path.starts_with("//") && !path.starts_with("///") {
        2
    } else if path.starts_with('/') {
        1
    } else {
        0
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                let can_pop = segments.last().is_some_and(|last| *last != "..");
                if can_pop {
                    segments.pop();
                } else if leading_slashes == 0 {
                    segments.push("..");
                }
            },
            other => segments.push(other),
        }
    }

    let mut normalized = "/".repeat(leading_slashes);
    normalized.push_str(&segments.join("/"));
    if normalized.is_empty() {
        ".".to_string()
    } else {
        normalized
    }
}

/// Concatenates path parts with normalization.
///
/// An absolute part discards everything before it. Empty parts are skipped.
/// `join_paths(&["a/b", "../c"])` is `a/c`.
pub fn join_paths(parts: &[&str]) -> String {
    let mut result = String::new();

    for part in parts {
        if part.is_empty() {
            continue;
        }
        let part = normalize(part);
        if part.starts_with('/') {
            result = part;
        } else {
            if !result.is_empty() && result != "/" {
                result.push('/');
            }
            result.push_str(&part);
        }
    }

    normalize(&result)
}

/// Returns the path with its last component removed.
///
/// Runs of slashes count as one separator and trailing slashes are dropped
/// first, so `parent("a/b//")` is `a`. The parent of a single component,
/// and of `/x`, is the empty string.
pub fn parent(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    let mut previous_was_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !previous_was_slash {
                collapsed.push(c);
            }
            previous_was_slash = true;
        } else {
            collapsed.push(c);
            previous_was_slash = false;
        }
    }
    let trimmed = collapsed.trim_end_matches('/');

    match trimmed.rfind('/') {
        Some(0) | None => String::new(),
        Some(index) => trimmed[..index].to_string(),
    }
}

/// Final component of a slash-separated path.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}
