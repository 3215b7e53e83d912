use crate::config::Config;
use crate::conflicts::{Conflicts, Operation};
use crate::dotfiles::adjust_dotfile;
use crate::error::{Result, RustowError, StowError};
use crate::fs_utils::{self, CwdGuard};
use crate::ignore::IgnoreCache;
use crate::logging::Reporter;
use crate::ownership::{self, StowedPath};
use crate::paths::{basename, join_paths, parent};
use crate::report;
use crate::task::{Task, TaskLedger};
use std::collections::BTreeMap;
use std::path::Path;

pub const PROTECTED_MARKER: &str = ".nonstow";

/// Outcome of planning plus execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StowResult {
    pub success: bool,
    /// Package → conflict messages. Empty on success.
    pub conflicts: BTreeMap<String, Vec<String>>,
    /// Tasks executed, or in simulate mode the tasks that would have been.
    /// Empty when planning hit conflicts.
    pub tasks: Vec<Task>,
}

/// Plans stow and unstow operations for packages of one stow directory
/// into one target directory.
///
/// Planning only reads the filesystem. Each `plan_*` call appends to the
/// same task ledger, so an unstow batch followed by a stow batch plans as
/// if the first had already run. Nothing touches the disk until
/// [`Stower::process_tasks`].
pub struct Stower<'a> {
    pub(crate) config: &'a Config,
    pub(crate) reporter: Reporter,
    /// The stow directory relative to the target directory.
    pub(crate) stow_path: String,
    pub(crate) ledger: TaskLedger,
    pub(crate) conflicts: Conflicts,
    pub(crate) ignore_cache: IgnoreCache,
    pub(crate) operation: Operation,
}

impl<'a> Stower<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        let reporter = Reporter::new(config.verbose);

        let stow_dir = fs_utils::canon_path(&config.dir)?;
        let target = fs_utils::canon_path(&config.target)?;
        let stow_path = pathdiff::diff_paths(&stow_dir, &target)
            .and_then(|p| p.to_str().map(str::to_string))
            .ok_or_else(|| {
                RustowError::internal(format!(
                    "cannot express {} relative to {}",
                    stow_dir, target
                ))
            })?;
        let stow_path = if stow_path.is_empty() {
            ".".to_string()
        } else {
            stow_path
        };

        report!(reporter, 2, 0, "stow dir is {}", stow_dir);
        report!(reporter, 2, 0, "stow dir path relative to target {} is {}", target, stow_path);

        Ok(Self {
            config,
            reporter,
            stow_path,
            ledger: TaskLedger::new(reporter),
            conflicts: Conflicts::new(),
            ignore_cache: IgnoreCache::new(config.home_dir.clone()),
            operation: Operation::Stow,
        })
    }

    pub fn stow_path(&self) -> &str {
        &self.stow_path
    }

    pub fn conflicts(&self) -> &Conflicts {
        &self.conflicts
    }

    /// Planned tasks in order, cancelled ones included.
    pub fn tasks(&self) -> &[Task] {
        self.ledger.tasks()
    }

    pub fn ledger(&self) -> &TaskLedger {
        &self.ledger
    }

    pub fn plan_stow<S: AsRef<str>>(&mut self, packages: &[S]) -> Result<()> {
        self.plan(Operation::Stow, packages)
    }

    pub fn plan_unstow<S: AsRef<str>>(&mut self, packages: &[S]) -> Result<()> {
        self.plan(Operation::Unstow, packages)
    }

    fn plan<S: AsRef<str>>(&mut self, operation: Operation, packages: &[S]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }
        self.operation = operation;

        let names: Vec<&str> = packages.iter().map(AsRef::as_ref).collect();
        report!(self.reporter, 2, 0, "Planning {} of: {} ...", operation, names.join(" "));

        let guard = CwdGuard::enter(&self.config.target, "target tree")?;
        for package in names {
            let package_path = join_paths(&[&self.stow_path, package]);
            fs_utils::require_directory(
                &package_path,
                &format!(
                    "The stow directory {} does not contain package {}",
                    self.stow_path, package
                ),
            )?;
            report!(self.reporter, 2, 0, "Planning {} of package {}...", operation, package);
            match operation {
                Operation::Stow => {
                    let stow_path = self.stow_path.clone();
                    self.stow_contents(&stow_path, package, ".", ".")?;
                },
                Operation::Unstow => self.unstow_contents(package, ".", ".")?,
            }
            report!(self.reporter, 2, 0, "Planning {} of package {}... done", operation, package);
        }
        guard.restore()
    }

    /// Executes the plan unless it has conflicts or this is a simulation.
    pub fn execute(&mut self) -> Result<StowResult> {
        if !self.conflicts.is_empty() {
            return Ok(StowResult {
                success: false,
                conflicts: self.conflicts.by_package(),
                tasks: Vec::new(),
            });
        }

        let tasks: Vec<Task> = self.ledger.live_tasks().cloned().collect();
        if !self.config.simulate {
            self.process_tasks()?;
        }
        Ok(StowResult {
            success: true,
            conflicts: BTreeMap::new(),
            tasks,
        })
    }

    /// Links the contents of `pkg_subdir` of `package` (found in
    /// `stow_path`) into `target_subdir`.
    ///
    /// `stow_path` is usually our own stow directory, but unfolding a tree
    /// owned by another stow directory passes that one in.
    pub(crate) fn stow_contents(
        &mut self,
        stow_path: &str,
        package: &str,
        pkg_subdir: &str,
        target_subdir: &str,
    ) -> Result<()> {
        if self.should_skip_target(pkg_subdir) {
            return Ok(());
        }

        if self.reporter.enabled(3) {
            let cwd = std::env::current_dir().unwrap_or_default();
            let message = format!(
                "Stowing contents of {} / {} / {} (cwd={})",
                stow_path,
                package,
                pkg_subdir,
                cwd.display()
            );
            report!(self.reporter, 3, 0, "{}", self.tildify(&message));
        }
        report!(self.reporter, 4, 1, "target subdir is {}", target_subdir);

        let pkg_path_from_cwd = join_paths(&[stow_path, package, pkg_subdir]);

        if !self.ledger.is_a_node(target_subdir)? {
            return Err(StowError::NonDirectoryTarget(target_subdir.to_string()).into());
        }

        for node in fs_utils::read_dir_sorted(&pkg_path_from_cwd)? {
            let package_node_path = join_paths(&[pkg_subdir, &node]);
            let mut target_node_path = join_paths(&[target_subdir, &node]);

            if self.should_ignore(stow_path, package, &target_node_path)? {
                continue;
            }

            if self.config.dotfiles {
                let adjusted = adjust_dotfile(&node);
                if adjusted != node {
                    report!(self.reporter, 4, 1, "Adjusting: {} => {}", node, adjusted);
                    target_node_path = join_paths(&[target_subdir, &adjusted]);
                }
            }

            self.stow_node(stow_path, package, &package_node_path, &target_node_path)?;
        }
        Ok(())
    }

    fn stow_node(
        &mut self,
        stow_path: &str,
        package: &str,
        pkg_subpath: &str,
        target_subpath: &str,
    ) -> Result<()> {
        report!(self.reporter, 3, 0, "Stowing entry {} / {} / {}", stow_path, package, pkg_subpath);

        let pkg_path_from_cwd = join_paths(&[stow_path, package, pkg_subpath]);

        // Absolute symlinks in a package cannot be unstowed later.
        if fs_utils::is_symlink(&pkg_path_from_cwd) {
            let source_dest = self.ledger.read_a_link(&pkg_path_from_cwd)?;
            if source_dest.starts_with('/') {
                self.record_conflict(
                    package,
                    format!(
                        "source is an absolute symlink {} => {}",
                        pkg_path_from_cwd, source_dest
                    ),
                );
                report!(self.reporter, 3, 0, "Absolute symlinks cannot be unstowed");
                return Ok(());
            }
        }

        let level = pkg_subpath.matches('/').count();
        report!(self.reporter, 2, 1, "level of {} is {}", pkg_subpath, level);

        let link_dest = join_paths(&["../".repeat(level).as_str(), &pkg_path_from_cwd]);
        report!(self.reporter, 4, 1, "link destination {}", link_dest);

        if self.ledger.is_a_link(target_subpath)? {
            self.stow_node_for_existing_link(package, pkg_subpath, target_subpath, &link_dest)
        } else if self.ledger.is_a_node(target_subpath)? {
            self.stow_node_for_existing_node(
                package,
                pkg_subpath,
                target_subpath,
                &pkg_path_from_cwd,
                &link_dest,
            )
        } else if self.config.no_folding
            && fs_utils::is_directory(&pkg_path_from_cwd)
            && !fs_utils::is_symlink(&pkg_path_from_cwd)
        {
            self.ledger.do_mkdir(target_subpath)?;
            let own_stow_path = self.stow_path.clone();
            self.stow_contents(&own_stow_path, package, pkg_subpath, target_subpath)
        } else {
            self.ledger.do_link(&link_dest, target_subpath)
        }
    }

    fn stow_node_for_existing_link(
        &mut self,
        package: &str,
        pkg_subpath: &str,
        target_subpath: &str,
        link_dest: &str,
    ) -> Result<()> {
        let existing_dest = self.ledger.read_a_link(target_subpath)?;
        if existing_dest.is_empty() {
            return Err(StowError::UnreadableLink(target_subpath.to_string()).into());
        }
        report!(self.reporter, 4, 1, "Evaluate existing link: {} => {}", target_subpath, existing_dest);

        let Some(stowed) = self.find_stowed_path(target_subpath, &existing_dest)? else {
            self.record_conflict(
                package,
                format!("existing target is not owned by stow: {}", target_subpath),
            );
            return Ok(());
        };

        if !self.ledger.is_a_node(&stowed.path)? {
            report!(self.reporter, 2, 0, "--- replacing invalid link: {}", target_subpath);
            self.ledger.do_unlink(target_subpath)?;
            return self.ledger.do_link(link_dest, target_subpath);
        }

        if existing_dest == link_dest {
            report!(self.reporter, 2, 0, "--- Skipping {} as it already points to {}", target_subpath, link_dest);
        } else if self.should_defer(target_subpath) {
            report!(self.reporter, 2, 0, "--- Deferring installation of: {}", target_subpath);
        } else if self.should_override(target_subpath) {
            report!(self.reporter, 2, 0, "--- Overriding installation of: {}", target_subpath);
            self.ledger.do_unlink(target_subpath)?;
            self.ledger.do_link(link_dest, target_subpath)?;
        } else if self.both_point_to_dirs(target_subpath, &existing_dest, link_dest)? {
            report!(self.reporter, 2, 0, "--- Unfolding {} which was already owned by {}", target_subpath, stowed.package);
            self.ledger.do_unlink(target_subpath)?;
            self.ledger.do_mkdir(target_subpath)?;
            self.stow_contents(&stowed.stow_dir, &stowed.package, pkg_subpath, target_subpath)?;
            let own_stow_path = self.stow_path.clone();
            self.stow_contents(&own_stow_path, package, pkg_subpath, target_subpath)?;
        } else {
            self.record_conflict(
                package,
                format!(
                    "existing target is stowed to a different package: {} => {}",
                    target_subpath, existing_dest
                ),
            );
        }
        Ok(())
    }

    /// Both the existing link and the proposed one lead to directories, so
    /// the existing link can be split open into a real directory.
    fn both_point_to_dirs(&self, target_subpath: &str, existing_dest: &str, link_dest: &str) -> Result<bool> {
        let base = parent(target_subpath);
        Ok(self.ledger.is_a_dir(&join_paths(&[&base, existing_dest]))?
            && self.ledger.is_a_dir(&join_paths(&[&base, link_dest]))?)
    }

    fn stow_node_for_existing_node(
        &mut self,
        package: &str,
        pkg_subpath: &str,
        target_subpath: &str,
        pkg_path_from_cwd: &str,
        link_dest: &str,
    ) -> Result<()> {
        report!(self.reporter, 4, 1, "Evaluate existing node: {}", target_subpath);

        if self.ledger.is_a_dir(target_subpath)? {
            if !fs_utils::is_directory(pkg_path_from_cwd) {
                self.record_conflict(
                    package,
                    format!(
                        "cannot stow non-directory {} over existing directory target {}",
                        pkg_path_from_cwd, target_subpath
                    ),
                );
                return Ok(());
            }
            let own_stow_path = self.stow_path.clone();
            return self.stow_contents(&own_stow_path, package, pkg_subpath, target_subpath);
        }

        if !self.config.adopt {
            self.record_conflict(
                package,
                format!(
                    "cannot stow {} over existing target {} since neither a link nor a directory and --adopt not specified",
                    pkg_path_from_cwd, target_subpath
                ),
            );
            return Ok(());
        }

        if fs_utils::is_directory(pkg_path_from_cwd) {
            self.record_conflict(
                package,
                format!(
                    "cannot stow directory {} over existing non-directory target {}",
                    pkg_path_from_cwd, target_subpath
                ),
            );
            return Ok(());
        }

        self.ledger.do_mv(target_subpath, pkg_path_from_cwd)?;
        self.ledger.do_link(link_dest, target_subpath)
    }

    pub(crate) fn find_stowed_path(&self, target_subpath: &str, link_dest: &str) -> Result<Option<StowedPath>> {
        ownership::find_stowed_path(&self.stow_path, target_subpath, link_dest, &self.reporter)
    }

    pub(crate) fn owning_package(&self, target_subpath: &str, link_dest: &str) -> Result<Option<String>> {
        Ok(self
            .find_stowed_path(target_subpath, link_dest)?
            .map(|stowed| stowed.package))
    }

    pub(crate) fn record_conflict(&mut self, package: &str, message: String) {
        report!(self.reporter, 2, 0, "CONFLICT when {} {}: {}", self.operation.progressive(), package, message);
        self.conflicts.record(self.operation, package, message);
    }

    /// Checks `target` (relative to the target directory, no leading `/`)
    /// against the command line ignore patterns, then against the ignore
    /// list of the package.
    pub(crate) fn should_ignore(&mut self, stow_path: &str, package: &str, target: &str) -> Result<bool> {
        if target.is_empty() {
            return Err(RustowError::internal("Stow.ignore() called with empty target"));
        }

        for suffix in &self.config.ignore {
            if suffix.is_match(target) {
                report!(self.reporter, 4, 1, "Ignoring path {} due to --ignore={}", target, suffix.as_str());
                return Ok(true);
            }
        }

        let package_dir = join_paths(&[stow_path, package]);
        let patterns = self.ignore_cache.for_package(&package_dir, &self.reporter)?;
        report!(
            self.reporter,
            5,
            2,
            "Ignore list regexp for paths:    {}",
            patterns.path_regex().map_or("none".to_string(), |re| format!("/{}/", re))
        );
        report!(
            self.reporter,
            5,
            2,
            "Ignore list regexp for segments: {}",
            patterns.segment_regex().map_or("none".to_string(), |re| format!("/{}/", re))
        );

        if patterns.matches_path(target) {
            report!(self.reporter, 4, 1, "Ignoring path /{}", target);
            return Ok(true);
        }

        let segment = basename(target);
        if patterns.matches_segment(segment) {
            report!(self.reporter, 4, 1, "Ignoring path segment {}", segment);
            return Ok(true);
        }

        report!(self.reporter, 5, 1, "Not ignoring {}", target);
        Ok(false)
    }

    pub(crate) fn should_defer(&self, path: &str) -> bool {
        self.config.defer.iter().any(|prefix| prefix.is_match(path))
    }

    pub(crate) fn should_override(&self, path: &str) -> bool {
        self.config
            .override_patterns
            .iter()
            .any(|prefix| prefix.is_match(path))
    }

    /// Stow directories, marked stow directories and protected directories
    /// are never descended into.
    pub(crate) fn should_skip_target(&self, target: &str) -> bool {
        if target == self.stow_path {
            self.reporter.warn(format_args!(
                "WARNING: skipping target which was current stow directory {}",
                target
            ));
            return true;
        }

        if ownership::is_marked_stow_dir(target) {
            self.reporter
                .warn(format_args!("WARNING: skipping marked Stow directory {}", target));
            return true;
        }

        if fs_utils::path_exists(&join_paths(&[target, PROTECTED_MARKER])) {
            self.reporter
                .warn(format_args!("WARNING: skipping protected directory {}", target));
            return true;
        }

        report!(self.reporter, 4, 1, "{} not protected; shouldn't skip", target);
        false
    }

    /// Abbreviates the home directory to `~` in trace output.
    pub(crate) fn tildify(&self, message: &str) -> String {
        match self.config.home_dir.as_deref().and_then(Path::to_str) {
            Some(home) if !home.is_empty() => message
                .replace(&format!("{}/", home), "~/")
                .replace(home, "~"),
            _ => message.to_string(),
        }
    }
}
