//! Deciding whether a symlink in the target tree belongs to stow.

use crate::error::{Result, RustowError};
use crate::fs_utils;
use crate::logging::Reporter;
use crate::paths::{join_paths, parent};
use crate::report;

pub const STOW_MARKER: &str = ".stow";

/// Where a stow-owned link points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StowedPath {
    /// The link destination resolved against the working directory.
    pub path: String,
    /// The stow directory that owns it.
    pub stow_dir: String,
    pub package: String,
}

pub fn is_marked_stow_dir(dir: &str) -> bool {
    fs_utils::path_exists(&join_paths(&[dir, STOW_MARKER]))
}

/// Resolves the link at `target_subpath` with destination `link_dest` and
/// reports which package of which stow directory it points into, if any.
///
/// A destination is owned when it lies under `stow_path`, or under any
/// ancestor directory that holds a `.stow` marker. Absolute destinations
/// are never owned.
pub fn find_stowed_path(
    stow_path: &str,
    target_subpath: &str,
    link_dest: &str,
    reporter: &Reporter,
) -> Result<Option<StowedPath>> {
    if link_dest.starts_with('/') {
        return Ok(None);
    }

    report!(reporter, 4, 2, "find_stowed_path(target={}; source={})", target_subpath, link_dest);
    let candidate = join_paths(&[&parent(target_subpath), link_dest]);
    report!(reporter, 4, 3, "is symlink destination {} owned by stow?", candidate);

    if let Some(remaining) = candidate.strip_prefix(&format!("{}/", stow_path)) {
        let package = remaining.split('/').next().unwrap_or_default();
        report!(reporter, 4, 3, "yes - package {} in {} may contain {}", package, stow_path, remaining);
        return Ok(Some(StowedPath {
            path: candidate.clone(),
            stow_dir: stow_path.to_string(),
            package: package.to_string(),
        }));
    }

    let segments: Vec<&str> = candidate.split('/').filter(|s| !s.is_empty()).collect();
    for last in 0..segments.len() {
        let so_far = segments[..=last].join("/");
        report!(reporter, 5, 5, "is {} marked stow dir?", so_far);
        if !is_marked_stow_dir(&so_far) {
            continue;
        }
        let Some(package) = segments.get(last + 1) else {
            return Err(RustowError::internal(
                "find_stowed_path() called directly on stow dir",
            ));
        };
        report!(reporter, 5, 5, "yes - {} in {} was marked as a stow dir; package={}", so_far, candidate, package);
        return Ok(Some(StowedPath {
            path: candidate.clone(),
            stow_dir: so_far,
            package: package.to_string(),
        }));
    }

    Ok(None)
}
