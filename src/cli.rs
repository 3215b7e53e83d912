use crate::config::StowMode;
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

/// stowfarm: manage farms of symbolic links into package trees
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Set target to DIR (default is parent of stow dir)
    #[clap(short, long, value_parser, value_name = "DIR")]
    pub target: Option<PathBuf>,

    /// Set stow dir to DIR (default is current dir)
    #[clap(short, long, value_parser, env = "STOW_DIR", value_name = "DIR")]
    pub dir: Option<PathBuf>,

    // The mode switches take an optional `=BOOL` only so that clap keeps
    // the position of every occurrence.
    /// Stow the package names that follow (the default)
    #[clap(short = 'S', long, action = ArgAction::Append, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_name = "BOOL", hide_possible_values = true)]
    pub stow: Vec<bool>,

    /// Unstow the package names that follow
    #[clap(short = 'D', long, action = ArgAction::Append, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_name = "BOOL", hide_possible_values = true)]
    pub delete: Vec<bool>,

    /// Restow the package names that follow (like -D then -S)
    #[clap(short = 'R', long, action = ArgAction::Append, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_name = "BOOL", hide_possible_values = true)]
    pub restow: Vec<bool>,

    /// Ignore files ending in this Perl-style regex
    #[clap(long = "ignore", value_name = "REGEX")]
    pub ignore_patterns: Vec<String>,

    /// Don't stow files beginning with this regex if the file is already
    /// stowed to another package
    #[clap(long = "defer", value_name = "REGEX")]
    pub defer_conflicts: Vec<String>,

    /// Force stowing files beginning with this regex if the file is
    /// already stowed to another package
    #[clap(long = "override", value_name = "REGEX")]
    pub override_conflicts: Vec<String>,

    /// Import existing files into the stow package from the target
    #[clap(long)]
    pub adopt: bool,

    /// Disable folding of newly stowed directories when stowing, and
    /// refolding of newly foldable directories when unstowing
    #[clap(long)]
    pub no_folding: bool,

    /// Enables special handling for dotfiles that are stowed
    /// ("dot-" prefix becomes ".")
    #[clap(long)]
    pub dotfiles: bool,

    /// Use legacy algorithm for unstowing
    #[clap(short = 'p', long)]
    pub compat: bool,

    /// Do not actually make any filesystem changes
    #[clap(short = 'n', long, visible_alias = "no")]
    pub simulate: bool,

    /// Increase verbosity, or set it with --verbose=N (levels are from 0 to 5)
    #[clap(short, long, action = ArgAction::Append, num_args = 0..=1, require_equals = true, default_missing_value = VERBOSE_STEP, value_name = "N")]
    pub verbose: Vec<String>,

    /// Packages to process
    #[clap(value_parser, required = true, num_args = 1..)]
    pub packages: Vec<String>,

    /// Mode switch in effect for each of `packages`, filled in by the
    /// ordered parsers.
    #[clap(skip)]
    modes: Vec<StowMode>,
}

const VERBOSE_STEP: &str = "+";

impl Args {
    /// Parses the process arguments like [`Parser::parse`], keeping track of
    /// which of `-S`, `-D` and `-R` each package follows.
    pub fn parse_ordered() -> Self {
        Self::parse_ordered_from(std::env::args_os())
    }

    pub fn parse_ordered_from<I, T>(itr: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_ordered_from(itr).unwrap_or_else(|e| e.exit())
    }

    pub fn try_parse_ordered_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(itr)?;
        let mut args = Self::from_arg_matches(&matches)?;
        args.modes = modes_by_position(&matches);
        Ok(args)
    }

    /// The mode for each package, in command line order.
    ///
    /// Without positions (plain [`Parser::parse_from`]) every package gets
    /// the strongest switch given: restow, then delete, then stow.
    pub fn package_modes(&self) -> Vec<StowMode> {
        if self.modes.len() == self.packages.len() {
            return self.modes.clone();
        }
        let mode = if !self.restow.is_empty() {
            StowMode::Restow
        } else if !self.delete.is_empty() {
            StowMode::Delete
        } else {
            StowMode::Stow
        };
        vec![mode; self.packages.len()]
    }

    /// Verbosity after applying `-v` and `--verbose[=N]` in order. A bare
    /// switch adds one, `=N` sets the level, and an unparsable `N` means 1.
    pub fn verbosity(&self) -> u8 {
        self.verbose.iter().fold(0u8, |level, value| {
            if value == VERBOSE_STEP {
                level.saturating_add(1)
            } else {
                value.parse().unwrap_or(1)
            }
        })
    }
}

fn modes_by_position(matches: &ArgMatches) -> Vec<StowMode> {
    let mut switches: Vec<(usize, StowMode)> = [
        ("stow", StowMode::Stow),
        ("delete", StowMode::Delete),
        ("restow", StowMode::Restow),
    ]
    .into_iter()
    .flat_map(|(id, mode)| {
        matches
            .indices_of(id)
            .into_iter()
            .flatten()
            .map(move |index| (index, mode))
    })
    .collect();
    switches.sort_by_key(|&(index, _)| index);

    matches
        .indices_of("packages")
        .into_iter()
        .flatten()
        .map(|package| {
            switches
                .iter()
                .take_while(|&&(index, _)| index < package)
                .last()
                .map_or(StowMode::Stow, |&(_, mode)| mode)
        })
        .collect()
}

/// Arguments for the `chkstow` auditor.
#[derive(Parser, Debug, Clone)]
#[clap(name = "chkstow", version, about = "Check a stow target tree for problems", long_about = None)]
pub struct ChkstowArgs {
    /// Set the target directory to DIR (default is $STOW_DIR or /usr/local)
    #[clap(short, long, value_parser, env = "STOW_DIR", value_name = "DIR")]
    pub target: Option<PathBuf>,

    /// Report symlinks that point to non-existent files (the default)
    #[clap(short = 'b', long, group = "mode")]
    pub badlinks: bool,

    /// Report non-symlinks in the target directory
    #[clap(short = 'a', long, group = "mode")]
    pub aliens: bool,

    /// List packages in the target directory
    #[clap(short = 'l', long, group = "mode")]
    pub list: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::lock_cwd;

    #[test]
    fn test_basic_stow_command() {
        let _lock = lock_cwd();
        unsafe {
            std::env::remove_var("STOW_DIR");
        }
        let args = Args::parse_ordered_from(["stowfarm", "mypackage"]);
        assert_eq!(args.packages, vec!["mypackage"]);
        assert_eq!(args.package_modes(), vec![StowMode::Stow]);
        assert!(args.delete.is_empty());
        assert!(args.restow.is_empty());
        assert!(!args.compat);
        assert_eq!(args.verbosity(), 0);
        assert!(!args.simulate);
        assert!(args.target.is_none());
        assert!(args.dir.is_none());
    }

    #[test]
    fn test_mode_flags() {
        let args = Args::parse_ordered_from(["stowfarm", "-D", "mypackage"]);
        assert_eq!(args.package_modes(), vec![StowMode::Delete]);
        let args = Args::parse_ordered_from(["stowfarm", "-R", "mypackage"]);
        assert_eq!(args.package_modes(), vec![StowMode::Restow]);
        let args = Args::parse_ordered_from(["stowfarm", "--stow", "mypackage"]);
        assert_eq!(args.package_modes(), vec![StowMode::Stow]);
    }

    #[test]
    fn test_mode_switches_apply_to_following_packages() {
        let args = Args::parse_ordered_from(["stowfarm", "-D", "a", "-S", "b"]);
        assert_eq!(args.packages, vec!["a", "b"]);
        assert_eq!(args.package_modes(), vec![StowMode::Delete, StowMode::Stow]);

        let args = Args::parse_ordered_from(["stowfarm", "a", "-D", "b", "c", "-n", "d", "-R", "e", "-D", "f"]);
        assert_eq!(
            args.package_modes(),
            vec![
                StowMode::Stow,
                StowMode::Delete,
                StowMode::Delete,
                StowMode::Delete,
                StowMode::Restow,
                StowMode::Delete,
            ]
        );
        assert!(args.simulate);
    }

    #[test]
    fn test_mode_switch_in_short_cluster() {
        let args = Args::parse_ordered_from(["stowfarm", "-nD", "a", "-vS", "b"]);
        assert!(args.simulate);
        assert_eq!(args.verbosity(), 1);
        assert_eq!(args.package_modes(), vec![StowMode::Delete, StowMode::Stow]);
    }

    #[test]
    fn test_unordered_parse_uses_strongest_switch() {
        let args = Args::parse_from(["stowfarm", "-D", "a", "b"]);
        assert_eq!(args.package_modes(), vec![StowMode::Delete, StowMode::Delete]);
        let args = Args::parse_from(["stowfarm", "-D", "a", "-R", "b"]);
        assert_eq!(args.package_modes(), vec![StowMode::Restow, StowMode::Restow]);
    }

    #[test]
    fn test_target_and_dir_options() {
        let args = Args::parse_from(["stowfarm", "-t", "/target/dir", "-d", "/stow/dir", "mypackage"]);
        assert_eq!(args.target, Some(PathBuf::from("/target/dir")));
        assert_eq!(args.dir, Some(PathBuf::from("/stow/dir")));
    }

    #[test]
    fn test_verbose_option() {
        let args = Args::parse_from(["stowfarm", "-vvv", "mypackage"]);
        assert_eq!(args.verbosity(), 3);
        let args = Args::parse_from(["stowfarm", "-v", "--verbose", "mypackage"]);
        assert_eq!(args.verbosity(), 2);
    }

    #[test]
    fn test_verbose_with_level() {
        let args = Args::parse_from(["stowfarm", "--verbose=4", "mypackage"]);
        assert_eq!(args.verbosity(), 4);
        assert_eq!(args.packages, vec!["mypackage"]);
        let args = Args::parse_from(["stowfarm", "-v", "--verbose=2", "-v", "mypackage"]);
        assert_eq!(args.verbosity(), 3);
        let args = Args::parse_from(["stowfarm", "--verbose=lots", "mypackage"]);
        assert_eq!(args.verbosity(), 1);
    }

    #[test]
    fn test_multiple_packages() {
        let args = Args::parse_from(["stowfarm", "pkg1", "pkg2", "pkg3"]);
        assert_eq!(args.packages, vec!["pkg1", "pkg2", "pkg3"]);
    }

    #[test]
    fn test_packages_required() {
        assert!(Args::try_parse_from(["stowfarm"]).is_err());
    }

    #[test]
    fn test_simulate_spellings() {
        for flag in ["-n", "--simulate", "--no"] {
            let args = Args::parse_from(["stowfarm", flag, "mypackage"]);
            assert!(args.simulate, "{} should enable simulate", flag);
        }
    }

    #[test]
    fn test_pattern_options_repeat() {
        let args = Args::parse_from([
            "stowfarm",
            "--override=foo",
            "--override=bar",
            "--defer=baz",
            "--ignore",
            "qux",
            "mypackage",
        ]);
        assert_eq!(args.override_conflicts, vec!["foo", "bar"]);
        assert_eq!(args.defer_conflicts, vec!["baz"]);
        assert_eq!(args.ignore_patterns, vec!["qux"]);
    }

    #[test]
    fn test_boolean_flags() {
        let args = Args::parse_from(["stowfarm", "--adopt", "--no-folding", "--dotfiles", "-p", "mypackage"]);
        assert!(args.adopt);
        assert!(args.no_folding);
        assert!(args.dotfiles);
        assert!(args.compat);
    }

    #[test]
    fn test_stow_dir_from_env_and_option_precedence() {
        let _lock = lock_cwd();
        unsafe {
            std::env::set_var("STOW_DIR", "/env/stow/path");
        }
        let from_env = Args::parse_from(["stowfarm", "mypackage"]);
        let from_option = Args::parse_from(["stowfarm", "-d", "/cmd/stow/path", "mypackage"]);
        unsafe {
            std::env::remove_var("STOW_DIR");
        }
        assert_eq!(from_env.dir, Some(PathBuf::from("/env/stow/path")));
        assert_eq!(from_option.dir, Some(PathBuf::from("/cmd/stow/path")));
    }

    #[test]
    fn test_chkstow_modes_are_exclusive() {
        let args = ChkstowArgs::parse_from(["chkstow", "-t", "/usr/local", "-l"]);
        assert!(args.list);
        assert_eq!(args.target, Some(PathBuf::from("/usr/local")));
        assert!(ChkstowArgs::try_parse_from(["chkstow", "-a", "-l"]).is_err());
    }
}
