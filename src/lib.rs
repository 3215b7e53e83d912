pub mod chkstow;
pub mod cli;
pub mod config;
pub mod conflicts;
pub mod dotfiles;
pub mod error;
pub mod executor;
pub mod fs_utils;
pub mod ignore;
pub mod logging;
pub mod ownership;
pub mod paths;
pub mod stow;
pub mod task;
pub mod unstow;

pub use crate::config::{Config, StowMode};
pub use crate::error::{Result, RustowError};
pub use crate::stow::{StowResult, Stower};

/// Plans and, unless simulating, performs stowing of `packages`.
pub fn stow<S: AsRef<str>>(config: &Config, packages: &[S]) -> Result<StowResult> {
    let mut stower = Stower::new(config)?;
    stower.plan_stow(packages)?;
    stower.execute()
}

pub fn unstow<S: AsRef<str>>(config: &Config, packages: &[S]) -> Result<StowResult> {
    let mut stower = Stower::new(config)?;
    stower.plan_unstow(packages)?;
    stower.execute()
}

/// Unstow then stow, planned together so links that would be removed and
/// recreated unchanged are left alone.
pub fn restow<S: AsRef<str>>(config: &Config, packages: &[S]) -> Result<StowResult> {
    let mut stower = Stower::new(config)?;
    stower.plan_unstow(packages)?;
    stower.plan_stow(packages)?;
    stower.execute()
}

/// Unstows `config.unstow_packages` and stows `config.stow_packages` as one
/// plan, executed only if neither half conflicts.
pub fn run(config: &Config) -> Result<StowResult> {
    let mut stower = Stower::new(config)?;
    stower.plan_unstow(config.unstow_packages.as_slice())?;
    stower.plan_stow(config.stow_packages.as_slice())?;
    stower.execute()
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::config::Config;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::{TempDir, tempdir};

    lazy_static::lazy_static! {
        static ref CWD_LOCK: Mutex<()> = Mutex::new(());
    }

    /// Serializes tests that change the working directory or the
    /// environment.
    pub fn lock_cwd() -> MutexGuard<'static, ()> {
        CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A temporary root holding `stow/` and `target/`.
    pub struct Fixture {
        root: TempDir,
        pub stow: String,
        pub target: String,
    }

    impl Fixture {
        pub fn new() -> Self {
            let root = tempdir().unwrap();
            fs::create_dir(root.path().join("stow")).unwrap();
            fs::create_dir(root.path().join("target")).unwrap();
            let stow = root.path().join("stow").to_str().unwrap().to_string();
            let target = root.path().join("target").to_str().unwrap().to_string();
            Self { root, stow, target }
        }

        pub fn config(&self) -> Config {
            Config::new(&self.stow)
                .with_target(&self.target)
                .with_home_dir(None)
        }

        pub fn path(&self, rel: &str) -> PathBuf {
            self.root.path().join(rel)
        }

        pub fn make_dir(&self, rel: &str) {
            fs::create_dir_all(self.path(rel)).unwrap();
        }

        pub fn make_file(&self, rel: &str, content: &str) {
            let path = self.path(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        pub fn make_link(&self, rel: &str, dest: &str) {
            let path = self.path(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::os::unix::fs::symlink(dest, path).unwrap();
        }
    }
}
