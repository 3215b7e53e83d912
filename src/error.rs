use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = RustowError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum RustowError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Stow(#[from] StowError),
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error(transparent)]
    Ignore(#[from] IgnoreError),
    /// An invariant of the planner was violated. Never user error.
    #[error("BUG in stow: {0}")]
    Internal(String),
}

impl RustowError {
    pub fn internal(message: impl Into<String>) -> Self {
        RustowError::Internal(message.into())
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, RustowError::Internal(_))
    }

    /// Process exit status matching the reference tool.
    pub fn exit_code(&self) -> i32 {
        match self {
            RustowError::Stow(StowError::PackageMissing { errno, .. }) => *errno,
            RustowError::Fs(FsError::ReadDir { .. }) => 2,
            _ => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("--dir value '{0}' is not a valid directory")]
    InvalidStowDir(String),
    #[error("--target value '{0}' is not a valid directory")]
    InvalidTargetDir(String),
    #[error("Slashes are not permitted in package names")]
    InvalidPackageName(String),
    #[error("No packages to stow or unstow")]
    NoPackages,
    #[error("{0}")]
    InvalidRegexPattern(String),
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
}

#[derive(Error, Debug)]
pub enum StowError {
    #[error("{message}")]
    PackageMissing { message: String, errno: i32 },
    #[error("stow_contents() called with non-directory target: {0}")]
    NonDirectoryTarget(String),
    #[error("unstow_contents() called with non-directory path: {0}")]
    NonDirectoryPackagePath(String),
    #[error("unstow_contents() called with invalid target: {0}")]
    InvalidUnstowTarget(String),
    #[error("unstow_contents() in compat mode called with non-directory target: {0}")]
    NonDirectoryCompatTarget(String),
    #[error("Could not read link: {0}")]
    UnreadableLink(String),
    #[error("Could not read link: {path} ({source})")]
    ReadLink { path: String, source: io::Error },
}

#[derive(Error, Debug)]
pub enum FsError {
    #[error("Could not create directory: {path} ({source})")]
    CreateDirectory { path: String, source: io::Error },
    #[error("Could not create symlink: {link_path} => {target_path} ({source})")]
    CreateSymlink {
        link_path: String,
        target_path: String,
        source: io::Error,
    },
    #[error("Could not remove directory: {path} ({source})")]
    DeleteDirectory { path: String, source: io::Error },
    #[error("Could not remove link: {path} ({source})")]
    DeleteSymlink { path: String, source: io::Error },
    #[error("Could not move {from} -> {to} ({source})")]
    MoveFile {
        from: String,
        to: String,
        source: io::Error,
    },
    #[error("could not readlink {path} ({source})")]
    ReadSymlink { path: String, source: io::Error },
    #[error("cannot read directory: {path} ({source})")]
    ReadDir { path: String, source: io::Error },
    #[error("Cannot chdir to {name}: {path} ({source})")]
    Chdir {
        name: String,
        path: String,
        source: io::Error,
    },
    #[error("Your current directory {0} seems to have vanished")]
    CwdVanished(String),
    #[error("canon_path: cannot chdir to {path} from {cwd}")]
    Canonicalize { path: String, cwd: String },
    #[error("cannot walk {path} ({source})")]
    WalkDir { path: String, source: io::Error },
    #[error("cannot determine current directory ({0})")]
    CurrentDir(io::Error),
    #[error("file name is not valid UTF-8: {0}")]
    NonUtf8Name(PathBuf),
}

#[derive(Error, Debug)]
pub enum IgnoreError {
    #[error("Failed to compile regexp: {0}")]
    InvalidPattern(#[from] regex::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_error_display() {
        let err = RustowError::internal("creating link and dir: bin");
        assert_eq!(err.to_string(), "BUG in stow: creating link and dir: bin");
        assert!(err.is_internal());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidStowDir("/invalid/path".to_string());
        assert_eq!(
            err.to_string(),
            "--dir value '/invalid/path' is not a valid directory"
        );
    }

    #[test]
    fn test_package_missing_exit_code() {
        let err: RustowError = StowError::PackageMissing {
            message: "The stow directory ../stow does not contain package nope".to_string(),
            errno: 20,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "The stow directory ../stow does not contain package nope"
        );
        assert_eq!(err.exit_code(), 20);
    }

    #[test]
    fn test_fs_error_display() {
        let err = FsError::CreateSymlink {
            link_path: "bin".to_string(),
            target_path: "../stow/pkg/bin".to_string(),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "File exists"),
        };
        assert_eq!(
            err.to_string(),
            "Could not create symlink: bin => ../stow/pkg/bin (File exists)"
        );
    }

    #[test]
    fn test_read_dir_exit_code() {
        let err: RustowError = FsError::ReadDir {
            path: "../stow/pkg".to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied"),
        }
        .into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_error_conversion() {
        let config_err = ConfigError::NoPackages;
        let rustow_err: RustowError = config_err.into();
        assert!(matches!(rustow_err, RustowError::Config(_)));

        let stow_err = StowError::UnreadableLink("bin".to_string());
        let rustow_err: RustowError = stow_err.into();
        assert!(matches!(rustow_err, RustowError::Stow(_)));
    }
}
