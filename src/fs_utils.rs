use crate::error::{FsError, Result, RustowError, StowError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// `stat`-based directory test; follows symlinks.
pub fn is_directory(path: &str) -> bool {
    Path::new(path).is_dir()
}

/// `lstat`-based symlink test.
pub fn is_symlink(path: &str) -> bool {
    Path::new(path).is_symlink()
}

/// `stat`-based existence test; a dangling link does not exist.
pub fn path_exists(path: &str) -> bool {
    Path::new(path).exists()
}

pub fn read_link(path: &str) -> Result<String> {
    let dest: PathBuf = fs::read_link(path).map_err(|source| FsError::ReadSymlink {
        path: path.to_string(),
        source,
    })?;
    path_to_string(dest)
}

fn path_to_string(path: PathBuf) -> Result<String> {
    path.into_os_string()
        .into_string()
        .map_err(|raw| FsError::NonUtf8Name(PathBuf::from(raw)).into())
}

/// Lists a directory's entry names in byte-wise sorted order.
///
/// The order is part of the planner's contract: it decides the order in
/// which tasks are appended to the ledger.
pub fn read_dir_sorted(path: &str) -> Result<Vec<String>> {
    let entries = fs::read_dir(path).map_err(|source| FsError::ReadDir {
        path: path.to_string(),
        source,
    })?;

    let mut names: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| FsError::ReadDir {
            path: path.to_string(),
            source,
        })?;
        let name = entry
            .file_name()
            .into_string()
            .map_err(|raw| FsError::NonUtf8Name(Path::new(path).join(raw)))?;
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// Fails with `message` unless `path` is a directory. The exit status is the
/// OS errno, or ENOTDIR when the path exists but is something else.
pub fn require_directory(path: &str, message: &str) -> Result<()> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(StowError::PackageMissing {
            message: message.to_string(),
            errno: ENOTDIR,
        }
        .into()),
        Err(e) => Err(StowError::PackageMissing {
            message: message.to_string(),
            errno: e.raw_os_error().unwrap_or(1),
        }
        .into()),
    }
}

const ENOTDIR: i32 = 20;
const EISDIR: i32 = 21;

fn current_dir() -> Result<String> {
    let cwd = std::env::current_dir().map_err(FsError::CurrentDir)?;
    path_to_string(cwd)
}

/// Scoped change of the process working directory.
///
/// The previous directory is restored by [`CwdGuard::restore`], or on drop
/// if the guard goes out of scope on an error path.
#[derive(Debug)]
pub struct CwdGuard {
    previous: Option<String>,
}

impl CwdGuard {
    /// Changes into `path`; `name` describes it in the error message.
    pub fn enter(path: &str, name: &str) -> Result<Self> {
        let previous = current_dir()?;
        std::env::set_current_dir(path).map_err(|source| FsError::Chdir {
            name: name.to_string(),
            path: path.to_string(),
            source,
        })?;
        log::trace!(target: "stowfarm", "cwd now {}", path);
        Ok(Self {
            previous: Some(previous),
        })
    }

    pub fn previous(&self) -> &str {
        self.previous.as_deref().unwrap_or_default()
    }

    pub fn restore(mut self) -> Result<()> {
        match self.previous.take() {
            Some(previous) => restore_cwd(&previous),
            None => Ok(()),
        }
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            if let Err(e) = restore_cwd(&previous) {
                log::warn!(target: "stowfarm", "{}", e);
            }
        }
    }
}

fn restore_cwd(previous: &str) -> Result<()> {
    std::env::set_current_dir(previous)
        .map_err(|_| RustowError::from(FsError::CwdVanished(previous.to_string())))?;
    log::trace!(target: "stowfarm", "cwd restored to {}", previous);
    Ok(())
}

/// Absolute, symlink-free form of a directory, found by changing into it
/// and reading the working directory back.
pub fn canon_path(path: &str) -> Result<String> {
    let cwd = current_dir()?;
    std::env::set_current_dir(path).map_err(|_| FsError::Canonicalize {
        path: path.to_string(),
        cwd: cwd.clone(),
    })?;
    let canonical = current_dir();
    restore_cwd(&cwd)?;
    canonical
}

pub fn create_symlink(link_path: &str, target_path: &str) -> Result<()> {
    #[cfg(unix)]
    let created = std::os::unix::fs::symlink(target_path, link_path);
    #[cfg(windows)]
    let created = if Path::new(link_path)
        .parent()
        .map(|dir| dir.join(target_path).is_dir())
        .unwrap_or(false)
    {
        std::os::windows::fs::symlink_dir(target_path, link_path)
    } else {
        std::os::windows::fs::symlink_file(target_path, link_path)
    };
    #[cfg(not(any(unix, windows)))]
    let created: io::Result<()> = Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Symlink creation not supported on this platform",
    ));

    created.map_err(|source| {
        FsError::CreateSymlink {
            link_path: link_path.to_string(),
            target_path: target_path.to_string(),
            source,
        }
        .into()
    })
}

/// Removes a link, refusing to touch anything `lstat` reports as a
/// directory.
pub fn remove_link(path: &str) -> Result<()> {
    let delete_error = |source: io::Error| -> RustowError {
        FsError::DeleteSymlink {
            path: path.to_string(),
            source,
        }
        .into()
    };
    let metadata = fs::symlink_metadata(path).map_err(delete_error)?;
    if metadata.is_dir() {
        return Err(delete_error(io::Error::from_raw_os_error(EISDIR)));
    }
    fs::remove_file(path).map_err(delete_error)
}

pub fn create_dir(path: &str) -> Result<()> {
    fs::create_dir(path).map_err(|source| {
        FsError::CreateDirectory {
            path: path.to_string(),
            source,
        }
        .into()
    })
}

pub fn remove_dir(path: &str) -> Result<()> {
    fs::remove_dir(path).map_err(|source| {
        FsError::DeleteDirectory {
            path: path.to_string(),
            source,
        }
        .into()
    })
}

/// Moves a file, overwriting `to`. Falls back to copy and remove when the
/// two paths are on different filesystems.
pub fn move_file(from: &str, to: &str) -> Result<()> {
    let move_error = |source: io::Error| -> RustowError {
        FsError::MoveFile {
            from: from.to_string(),
            to: to.to_string(),
            source,
        }
        .into()
    };
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to).map_err(move_error)?;
            fs::remove_file(from).map_err(move_error)
        },
        Err(e) => Err(move_error(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::lock_cwd;
    use std::fs::File;
    use tempfile::tempdir;

    fn utf8(path: &Path) -> String {
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_is_directory_follows_links() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real_dir");
        fs::create_dir(&real).unwrap();
        let link = dir.path().join("link_to_dir");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        assert!(is_directory(&utf8(&real)));
        assert!(is_directory(&utf8(&link)));
        assert!(is_symlink(&utf8(&link)));
        assert!(!is_symlink(&utf8(&real)));
    }

    #[test]
    fn test_dangling_link_is_symlink_but_does_not_exist() {
        let dir = tempdir().unwrap();
        let link = dir.path().join("broken");
        std::os::unix::fs::symlink("nowhere", &link).unwrap();

        assert!(is_symlink(&utf8(&link)));
        assert!(!path_exists(&utf8(&link)));
        assert_eq!(read_link(&utf8(&link)).unwrap(), "nowhere");
    }

    #[test]
    fn test_read_link_on_regular_file_fails() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain");
        File::create(&file).unwrap();

        let result = read_link(&utf8(&file));
        assert!(matches!(
            result,
            Err(RustowError::Fs(FsError::ReadSymlink { .. }))
        ));
    }

    #[test]
    fn test_read_dir_sorted_is_bytewise() {
        let dir = tempdir().unwrap();
        for name in ["b", "a", "B", "_x", "a.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }

        let names = read_dir_sorted(&utf8(dir.path())).unwrap();
        assert_eq!(names, vec!["B", "_x", "a", "a.txt", "b"]);
    }

    #[test]
    fn test_read_dir_sorted_missing_dir() {
        let dir = tempdir().unwrap();
        let result = read_dir_sorted(&utf8(&dir.path().join("missing")));
        let err = result.unwrap_err();
        assert!(err.to_string().starts_with("cannot read directory:"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_require_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file");
        File::create(&file).unwrap();

        assert!(require_directory(&utf8(dir.path()), "unused").is_ok());

        let err = require_directory(&utf8(&file), "not a dir").unwrap_err();
        assert_eq!(err.to_string(), "not a dir");
        assert_eq!(err.exit_code(), ENOTDIR);

        let err = require_directory(&utf8(&dir.path().join("missing")), "gone").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_remove_link_refuses_directory() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let err = remove_link(&utf8(&sub)).unwrap_err();
        assert!(err.to_string().starts_with("Could not remove link:"));
        assert!(sub.is_dir());
    }

    #[test]
    fn test_remove_link_deletes_dangling_link() {
        let dir = tempdir().unwrap();
        let link = dir.path().join("dangling");
        create_symlink(&utf8(&link), "../nowhere").unwrap();
        remove_link(&utf8(&link)).unwrap();
        assert!(!link.is_symlink());
    }

    #[test]
    fn test_move_file_overwrites_destination() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("from");
        let to = dir.path().join("to");
        fs::write(&from, "adopted").unwrap();
        fs::write(&to, "original").unwrap();

        move_file(&utf8(&from), &utf8(&to)).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "adopted");
    }

    #[test]
    fn test_canon_path_resolves_symlinked_parent() {
        let _lock = lock_cwd();
        let dir = tempdir().unwrap();
        let real = dir.path().join("real");
        fs::create_dir_all(real.join("inner")).unwrap();
        let alias = dir.path().join("alias");
        std::os::unix::fs::symlink(&real, &alias).unwrap();

        let before = std::env::current_dir().unwrap();
        let canonical = canon_path(&utf8(&alias.join("inner"))).unwrap();
        assert_eq!(
            PathBuf::from(canonical),
            fs::canonicalize(real.join("inner")).unwrap()
        );
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn test_canon_path_missing_directory() {
        let _lock = lock_cwd();
        let dir = tempdir().unwrap();
        let err = canon_path(&utf8(&dir.path().join("missing"))).unwrap_err();
        assert!(err.to_string().starts_with("canon_path: cannot chdir to"));
    }

    #[test]
    fn test_cwd_guard_restores_on_drop() {
        let _lock = lock_cwd();
        let dir = tempdir().unwrap();
        let before = std::env::current_dir().unwrap();
        {
            let guard = CwdGuard::enter(&utf8(dir.path()), "target tree").unwrap();
            assert_eq!(
                fs::canonicalize(std::env::current_dir().unwrap()).unwrap(),
                fs::canonicalize(dir.path()).unwrap()
            );
            assert_eq!(guard.previous(), before.to_str().unwrap());
        }
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn test_cwd_guard_enter_failure_names_directory() {
        let _lock = lock_cwd();
        let dir = tempdir().unwrap();
        let missing = utf8(&dir.path().join("missing"));
        let err = CwdGuard::enter(&missing, "target tree").unwrap_err();
        assert!(
            err.to_string()
                .starts_with(&format!("Cannot chdir to target tree: {}", missing))
        );
    }
}
