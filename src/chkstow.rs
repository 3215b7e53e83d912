//! Read-only audit of a target tree: dangling links, files that are not
//! links, and the packages links point into.

use crate::cli::ChkstowArgs;
use crate::error::{FsError, Result};
use crate::logging::Reporter;
use crate::ownership::STOW_MARKER;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

pub const DEFAULT_TARGET: &str = "/usr/local/";

/// Directories holding this file are never audited.
pub const NOT_STOWED_MARKER: &str = ".notstowed";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    BadLinks,
    Aliens,
    List,
}

impl Mode {
    pub fn from_args(args: &ChkstowArgs) -> Self {
        if args.list {
            Mode::List
        } else if args.aliens {
            Mode::Aliens
        } else {
            Mode::BadLinks
        }
    }
}

/// Lines `chkstow` prints for `target` in `mode`.
pub fn check(target: &str, mode: Mode) -> Result<Vec<String>> {
    match mode {
        Mode::BadLinks => Ok(find_bad_links(target)?
            .into_iter()
            .map(|path| format!("Bogus link: {}", path))
            .collect()),
        Mode::Aliens => Ok(find_aliens(target)?
            .into_iter()
            .map(|path| format!("Unstowed file: {}", path))
            .collect()),
        Mode::List => list_packages(target),
    }
}

/// Symlinks whose destination does not exist.
pub fn find_bad_links(target: &str) -> Result<Vec<String>> {
    let mut found = Vec::new();
    walk_target(target, |entry, display| {
        if entry.path_is_symlink() && !entry.path().exists() {
            found.push(display);
        }
        Ok(())
    })?;
    Ok(found)
}

/// Entries that are neither symlinks nor directories.
pub fn find_aliens(target: &str) -> Result<Vec<String>> {
    let mut found = Vec::new();
    walk_target(target, |entry, display| {
        if !entry.path_is_symlink() && !entry.path().is_dir() {
            found.push(display);
        }
        Ok(())
    })?;
    Ok(found)
}

/// Sorted names of the packages that links in `target` point into.
pub fn list_packages(target: &str) -> Result<Vec<String>> {
    let mut packages = BTreeSet::new();
    walk_target(target, |entry, display| {
        if !entry.path_is_symlink() {
            return Ok(());
        }
        let dest = fs::read_link(entry.path()).map_err(|source| FsError::ReadSymlink {
            path: display,
            source,
        })?;
        packages.insert(package_of(&dest.to_string_lossy()).to_string());
        Ok(())
    })?;

    packages.remove("");
    packages.remove("..");
    Ok(packages.into_iter().collect())
}

/// First segment of `dest` once any `(../)+stow/` prefix is gone.
fn package_of(dest: &str) -> &str {
    let mut rest = dest;
    while let Some(shorter) = rest.strip_prefix("../") {
        rest = shorter;
    }
    let rest = match rest.strip_prefix("stow/") {
        Some(inside) if rest.len() < dest.len() => inside,
        _ => dest,
    };
    rest.split('/').next().unwrap_or_default()
}

/// Visits every entry under `target`, plain entries of a directory before
/// its subdirectories, each group by name. Directories carrying a stow or
/// not-stowed marker are reported on stderr and pruned, as are directories
/// that cannot be read.
fn walk_target<F>(target: &str, mut visit: F) -> Result<()>
where
    F: FnMut(&DirEntry, String) -> Result<()>,
{
    let reporter = Reporter::default();
    let walker = WalkDir::new(target)
        .sort_by(|a, b| {
            a.file_type()
                .is_dir()
                .cmp(&b.file_type().is_dir())
                .then_with(|| a.file_name().cmp(b.file_name()))
        })
        .into_iter()
        .filter_entry(|entry| {
            if entry.file_type().is_dir() && is_excluded_dir(entry.path()) {
                reporter.warn(format_args!("skipping {}", display_path(target, entry.path())));
                return false;
            }
            true
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // Only the target itself must be readable.
            Err(e) if e.depth() > 0 => {
                reporter.warn(format_args!("{}", walk_error(target, e)));
                continue;
            },
            Err(e) => return Err(walk_error(target, e).into()),
        };
        let display = display_path(target, entry.path());
        visit(&entry, display)?;
    }
    Ok(())
}

fn walk_error(target: &str, e: walkdir::Error) -> FsError {
    FsError::WalkDir {
        path: e
            .path()
            .map_or_else(|| target.to_string(), |p| display_path(target, p)),
        source: e
            .into_io_error()
            .unwrap_or_else(|| io::Error::other("walkdir error")),
    }
}

fn is_excluded_dir(dir: &Path) -> bool {
    dir.join(STOW_MARKER).exists() || dir.join(NOT_STOWED_MARKER).exists()
}

fn display_path(target: &str, path: &Path) -> String {
    match path.strip_prefix(target) {
        Ok(rel) if rel.as_os_str().is_empty() => target.to_string(),
        Ok(rel) => format!("{}/{}", target, rel.display()),
        Err(_) => path.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::{TempDir, tempdir};

    fn write(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn link(root: &Path, rel: &str, dest: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        symlink(dest, path).unwrap();
    }

    /// A target holding a marked stow directory with perl and emacs stowed.
    fn perl_and_emacs() -> (TempDir, String) {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(root, "stow/.stow");
        for file in [
            "stow/perl/bin/perl",
            "stow/perl/bin/a2p",
            "stow/perl/info/perl",
            "stow/perl/man/man1/perl.1",
            "stow/emacs/bin/emacs",
            "stow/emacs/bin/etags",
            "stow/emacs/info/emacs",
            "stow/emacs/man/man1/emacs.1",
        ] {
            write(root, file);
        }
        fs::create_dir_all(root.join("stow/perl/lib/perl")).unwrap();
        fs::create_dir_all(root.join("stow/emacs/libexec/emacs")).unwrap();

        link(root, "bin/a2p", "../stow/perl/bin/a2p");
        link(root, "bin/emacs", "../stow/emacs/bin/emacs");
        link(root, "bin/etags", "../stow/emacs/bin/etags");
        link(root, "bin/perl", "../stow/perl/bin/perl");
        link(root, "info/emacs", "../stow/emacs/info/emacs");
        link(root, "info/perl", "../stow/perl/info/perl");
        link(root, "lib", "stow/perl/lib");
        link(root, "libexec", "stow/emacs/libexec");
        link(root, "man/man1/emacs", "../../stow/emacs/man/man1/emacs.1");
        link(root, "man/man1/perl", "../../stow/perl/man/man1/perl.1");

        let target = root.to_str().unwrap().to_string();
        (dir, target)
    }

    #[test]
    fn test_list_packages() {
        let (_dir, target) = perl_and_emacs();
        // Links without a leading ../ keep the stow directory name.
        assert_eq!(list_packages(&target).unwrap(), vec!["emacs", "perl", "stow"]);
    }

    #[test]
    fn test_clean_tree_has_no_findings() {
        let (_dir, target) = perl_and_emacs();
        assert!(find_bad_links(&target).unwrap().is_empty());
        assert!(find_aliens(&target).unwrap().is_empty());
    }

    #[test]
    fn test_detects_alien_and_bogus_link() {
        let (dir, target) = perl_and_emacs();
        write(dir.path(), "bin/alien");
        link(dir.path(), "bin/link", "ireallyhopethisfiledoesn/t.exist");

        assert_eq!(
            check(&target, Mode::Aliens).unwrap(),
            vec![format!("Unstowed file: {}/bin/alien", target)]
        );
        assert_eq!(
            check(&target, Mode::BadLinks).unwrap(),
            vec![format!("Bogus link: {}/bin/link", target)]
        );
    }

    #[test]
    fn test_notstowed_directory_is_pruned() {
        let dir = tempdir().unwrap();
        write(dir.path(), "protected/.notstowed");
        write(dir.path(), "protected/alien");
        write(dir.path(), "open/alien");
        let target = dir.path().to_str().unwrap();

        assert_eq!(find_aliens(target).unwrap(), vec![format!("{}/open/alien", target)]);
    }

    #[test]
    fn test_marked_target_root_is_pruned() {
        let dir = tempdir().unwrap();
        write(dir.path(), ".stow");
        write(dir.path(), "alien");
        assert!(find_aliens(dir.path().to_str().unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_directory_does_not_stop_the_audit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        write(dir.path(), "locked/hidden");
        write(dir.path(), "open/alien");
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        let target = dir.path().to_str().unwrap();

        let result = find_aliens(target);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // Privileged users can still read the locked directory.
        let found = result.unwrap();
        assert!(found.contains(&format!("{}/open/alien", target)));
    }

    #[test]
    fn test_missing_target_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        let err = find_aliens(missing.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().starts_with("cannot walk"), "{}", err);
    }

    #[test]
    fn test_package_of() {
        assert_eq!(package_of("../../stow/emacs/man/man1/emacs.1"), "emacs");
        assert_eq!(package_of("../stow/perl"), "perl");
        assert_eq!(package_of("stow/perl/lib"), "stow");
        assert_eq!(package_of("../elsewhere/x"), "..");
        assert_eq!(package_of("/abs/path"), "");
    }

    #[test]
    fn test_mode_from_args() {
        use clap::Parser;
        let args = ChkstowArgs::parse_from(["chkstow", "-t", "/tmp"]);
        assert_eq!(Mode::from_args(&args), Mode::BadLinks);
        let args = ChkstowArgs::parse_from(["chkstow", "--aliens", "-t", "/tmp"]);
        assert_eq!(Mode::from_args(&args), Mode::Aliens);
    }
}
