use crate::cli::Args;
use crate::error::{ConfigError, FsError, Result as RustowResult, RustowError};
use crate::fs_utils;
use crate::paths;
use regex::Regex;
use std::path::PathBuf;

/// What to do with the packages that follow a mode switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StowMode {
    #[default]
    Stow,
    Delete,
    Restow,
}

/// Options for one planning run.
///
/// Built once and not mutated afterwards; the `with_*` methods consume the
/// value and return an adjusted copy.
#[derive(Debug, Clone)]
pub struct Config {
    pub dir: String,
    pub target: String,
    /// Planned first, in one ledger with `stow_packages`.
    pub unstow_packages: Vec<String>,
    pub stow_packages: Vec<String>,
    pub adopt: bool,
    pub no_folding: bool,
    pub dotfiles: bool,
    pub compat: bool,
    pub simulate: bool,
    pub verbose: u8,
    /// Anchored at the end of the target path.
    pub ignore: Vec<Regex>,
    /// Anchored at the start of the target path.
    pub defer: Vec<Regex>,
    /// Anchored at the start of the target path.
    pub override_patterns: Vec<Regex>,
    /// Where `.stow-global-ignore` is looked up.
    pub home_dir: Option<PathBuf>,
}

impl Config {
    /// A configuration for stow directory `dir`, targeting its parent.
    pub fn new(dir: impl Into<String>) -> Self {
        let dir = dir.into();
        let target = default_target(&dir);
        Self {
            dir,
            target,
            unstow_packages: Vec::new(),
            stow_packages: Vec::new(),
            adopt: false,
            no_folding: false,
            dotfiles: false,
            compat: false,
            simulate: false,
            verbose: 0,
            ignore: Vec::new(),
            defer: Vec::new(),
            override_patterns: Vec::new(),
            home_dir: dirs::home_dir(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Appends `packages` to the unstow list, the stow list, or for
    /// [`StowMode::Restow`] both.
    pub fn with_packages<I, S>(mut self, mode: StowMode, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for package in packages {
            let package = package.into();
            match mode {
                StowMode::Stow => self.stow_packages.push(package),
                StowMode::Delete => self.unstow_packages.push(package),
                StowMode::Restow => {
                    self.unstow_packages.push(package.clone());
                    self.stow_packages.push(package);
                },
            }
        }
        self
    }

    pub fn with_adopt(mut self, adopt: bool) -> Self {
        self.adopt = adopt;
        self
    }

    pub fn with_no_folding(mut self, no_folding: bool) -> Self {
        self.no_folding = no_folding;
        self
    }

    pub fn with_dotfiles(mut self, dotfiles: bool) -> Self {
        self.dotfiles = dotfiles;
        self
    }

    pub fn with_compat(mut self, compat: bool) -> Self {
        self.compat = compat;
        self
    }

    pub fn with_simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_home_dir(mut self, home_dir: Option<PathBuf>) -> Self {
        self.home_dir = home_dir;
        self
    }

    pub fn with_ignore<S: AsRef<str>>(mut self, patterns: &[S]) -> RustowResult<Self> {
        self.ignore = compile_patterns(patterns, "--ignore", suffix_pattern)?;
        Ok(self)
    }

    pub fn with_defer<S: AsRef<str>>(mut self, patterns: &[S]) -> RustowResult<Self> {
        self.defer = compile_patterns(patterns, "--defer", prefix_pattern)?;
        Ok(self)
    }

    pub fn with_override<S: AsRef<str>>(mut self, patterns: &[S]) -> RustowResult<Self> {
        self.override_patterns = compile_patterns(patterns, "--override", prefix_pattern)?;
        Ok(self)
    }

    /// Resolves command line arguments: the stow directory comes from
    /// `--dir`, then `$STOW_DIR`, then the working directory, and must be a
    /// directory, as must an explicit `--target`. Each package goes to the
    /// list of the mode switch before it.
    pub fn from_args(args: Args) -> RustowResult<Self> {
        let modes = args.package_modes();
        let verbose = args.verbosity();

        let dir = match args.dir.filter(|d| !d.as_os_str().is_empty()) {
            Some(dir) => path_string(dir)?,
            None => {
                let cwd = std::env::current_dir().map_err(FsError::CurrentDir)?;
                path_string(cwd)?
            },
        };
        if !fs_utils::is_directory(&dir) {
            return Err(ConfigError::InvalidStowDir(dir).into());
        }

        let mut config = Config::new(dir);
        if let Some(target) = args.target {
            let target = path_string(target)?;
            if !fs_utils::is_directory(&target) {
                return Err(ConfigError::InvalidTargetDir(target).into());
            }
            config = config.with_target(target);
        }

        for (mode, package) in modes.into_iter().zip(sanitize_packages(&args.packages)?) {
            config = config.with_packages(mode, [package]);
        }

        config
            .with_adopt(args.adopt)
            .with_no_folding(args.no_folding)
            .with_dotfiles(args.dotfiles)
            .with_compat(args.compat)
            .with_simulate(args.simulate)
            .with_verbose(verbose)
            .with_ignore(&args.ignore_patterns)?
            .with_defer(&args.defer_conflicts)?
            .with_override(&args.override_conflicts)
    }
}

fn default_target(dir: &str) -> String {
    let parent = paths::parent(dir);
    if parent.is_empty() {
        ".".to_string()
    } else {
        parent
    }
}

fn path_string(path: PathBuf) -> RustowResult<String> {
    path.into_os_string()
        .into_string()
        .map_err(|raw| ConfigError::NonUtf8Path(PathBuf::from(raw)).into())
}

/// Strips one trailing slash from each name; any other slash is an error.
fn sanitize_packages(packages: &[String]) -> RustowResult<Vec<String>> {
    if packages.is_empty() {
        return Err(ConfigError::NoPackages.into());
    }
    packages
        .iter()
        .map(|package| {
            let package = package.strip_suffix('/').unwrap_or(package);
            if package.contains('/') {
                Err(RustowError::from(ConfigError::InvalidPackageName(package.to_string())))
            } else {
                Ok(package.to_string())
            }
        })
        .collect()
}

fn suffix_pattern(pattern: &str) -> String {
    format!(r"({})\z", pattern)
}

fn prefix_pattern(pattern: &str) -> String {
    format!(r"\A({})", pattern)
}

fn compile_patterns<S: AsRef<str>>(
    patterns: &[S],
    option: &str,
    anchor: fn(&str) -> String,
) -> RustowResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            let pattern = pattern.as_ref();
            Regex::new(&anchor(pattern)).map_err(|e| {
                RustowError::from(ConfigError::InvalidRegexPattern(format!(
                    "Invalid {} pattern '{}': {}",
                    option, pattern, e
                )))
            })
        })
        .collect()
}
