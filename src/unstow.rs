//! The removal half of the planner, including refolding of directories
//! that only hold links into a single package directory.

use crate::dotfiles::{adjust_dotfile, unadjust_dotfile};
use crate::error::{Result, RustowError, StowError};
use crate::fs_utils;
use crate::paths::{join_paths, parent};
use crate::report;
use crate::stow::Stower;
use crate::task::TaskAction;

impl Stower<'_> {
    /// Removes links to `pkg_subdir` of `package` from `target_subdir`.
    ///
    /// The package tree drives the traversal, except in compat mode where
    /// the target tree does.
    pub(crate) fn unstow_contents(&mut self, package: &str, pkg_subdir: &str, target_subdir: &str) -> Result<()> {
        if self.should_skip_target(target_subdir) {
            return Ok(());
        }

        let compat = self.config.compat;
        if self.reporter.enabled(3) {
            let cwd = std::env::current_dir().unwrap_or_default();
            let message = format!(
                "Unstowing contents of {} / {} / {} (cwd={}{})",
                self.stow_path,
                package,
                pkg_subdir,
                cwd.display(),
                if compat { ", compat" } else { "" }
            );
            report!(self.reporter, 3, 0, "{}", self.tildify(&message));
        }
        report!(self.reporter, 4, 1, "target subdir is {}", target_subdir);

        let pkg_path_from_cwd = join_paths(&[&self.stow_path, package, pkg_subdir]);

        if compat {
            if !fs_utils::is_directory(target_subdir) {
                return Err(StowError::NonDirectoryCompatTarget(target_subdir.to_string()).into());
            }
        } else {
            if !fs_utils::is_directory(&pkg_path_from_cwd) {
                return Err(StowError::NonDirectoryPackagePath(pkg_path_from_cwd).into());
            }
            if !self.ledger.is_a_node(target_subdir)? {
                return Err(StowError::InvalidUnstowTarget(target_subdir.to_string()).into());
            }
        }

        let dir_to_read = if compat { target_subdir } else { pkg_path_from_cwd.as_str() };
        let stow_path = self.stow_path.clone();

        for node in fs_utils::read_dir_sorted(dir_to_read)? {
            let mut package_node = node.clone();
            let mut target_node_path = join_paths(&[target_subdir, &node]);

            if self.should_ignore(&stow_path, package, &target_node_path)? {
                continue;
            }

            if self.config.dotfiles {
                if compat {
                    let adjusted = unadjust_dotfile(&node);
                    if adjusted != node {
                        report!(self.reporter, 4, 1, "Reverse adjusting: {} => {}", node, adjusted);
                        package_node = adjusted;
                    }
                } else {
                    let adjusted = adjust_dotfile(&node);
                    if adjusted != node {
                        report!(self.reporter, 4, 1, "Adjusting: {} => {}", node, adjusted);
                        target_node_path = join_paths(&[target_subdir, &adjusted]);
                    }
                }
            }

            let package_node_path = join_paths(&[pkg_subdir, &package_node]);
            self.unstow_node(package, &package_node_path, &target_node_path)?;
        }

        if !compat && fs_utils::is_directory(target_subdir) {
            self.cleanup_invalid_links(target_subdir)?;
        }
        Ok(())
    }

    fn unstow_node(&mut self, package: &str, pkg_subpath: &str, target_subpath: &str) -> Result<()> {
        report!(self.reporter, 3, 0, "Unstowing entry from target: {}", target_subpath);
        report!(self.reporter, 4, 1, "Package entry: {} / {} / {}", self.stow_path, package, pkg_subpath);

        if self.ledger.is_a_link(target_subpath)? {
            self.unstow_link_node(package, pkg_subpath, target_subpath)
        } else if fs_utils::is_directory(target_subpath) {
            self.unstow_contents(package, pkg_subpath, target_subpath)?;
            // Removing links may have left a directory that can fold again.
            if let Some(parent_in_pkg) = self.foldable(target_subpath)? {
                self.fold_tree(target_subpath, &parent_in_pkg)?;
            }
            Ok(())
        } else {
            if fs_utils::path_exists(target_subpath) {
                report!(self.reporter, 2, 1, "{} doesn't need to be unstowed", target_subpath);
            } else {
                report!(self.reporter, 2, 1, "{} did not exist to be unstowed", target_subpath);
            }
            Ok(())
        }
    }

    fn unstow_link_node(&mut self, package: &str, pkg_subpath: &str, target_subpath: &str) -> Result<()> {
        report!(self.reporter, 4, 2, "Evaluate existing link: {}", target_subpath);

        let link_dest = self.ledger.read_a_link(target_subpath)?;
        if link_dest.is_empty() {
            return Err(StowError::UnreadableLink(target_subpath.to_string()).into());
        }

        if link_dest.starts_with('/') {
            self.reporter.warn(format_args!(
                "Ignoring an absolute symlink: {} => {}",
                target_subpath, link_dest
            ));
            return Ok(());
        }

        // Links that stow doesn't own may point anywhere.
        let Some(stowed) = self.find_stowed_path(target_subpath, &link_dest)? else {
            report!(self.reporter, 5, 3, "Ignoring unowned link {} => {}", target_subpath, link_dest);
            return Ok(());
        };

        let pkg_path_from_cwd = join_paths(&[&self.stow_path, package, pkg_subpath]);

        if !fs_utils::path_exists(&stowed.path) {
            report!(self.reporter, 2, 0, "--- removing invalid link into a stow directory: {}", pkg_path_from_cwd);
            return self.ledger.do_unlink(target_subpath);
        }

        if stowed.path == pkg_path_from_cwd {
            self.ledger.do_unlink(target_subpath)
        } else {
            report!(self.reporter, 5, 3, "Ignoring link {} => {}", target_subpath, link_dest);
            Ok(())
        }
    }

    /// Schedules removal of dangling links in `dir` that stow owns. They
    /// would otherwise keep the directory from folding.
    pub(crate) fn cleanup_invalid_links(&mut self, dir: &str) -> Result<()> {
        report!(self.reporter, 2, 0, "Cleaning up any invalid links in {}", dir);

        if !fs_utils::is_directory(dir) {
            return Err(RustowError::internal(format!(
                "cleanup_invalid_links() called with a non-directory: {}",
                dir
            )));
        }

        for node in fs_utils::read_dir_sorted(dir)? {
            let node_path = join_paths(&[dir, &node]);
            if !fs_utils::is_symlink(&node_path) {
                continue;
            }
            report!(self.reporter, 4, 1, "Checking validity of link {}", node_path);

            if let Some(task) = self.ledger.link_task(&node_path) {
                if task.action != TaskAction::Remove {
                    self.reporter.warn(format_args!(
                        "Unexpected action {} scheduled for {}; skipping clean-up",
                        task.action, node_path
                    ));
                } else {
                    report!(self.reporter, 4, 2, "{} scheduled for removal; skipping clean-up", node_path);
                }
                continue;
            }

            let link_dest = fs_utils::read_link(&node_path)?;
            let resolved = join_paths(&[dir, &link_dest]);
            if fs_utils::path_exists(&resolved) {
                report!(self.reporter, 4, 2, "Link target {} exists at {}; skipping clean up", link_dest, resolved);
                continue;
            }

            report!(self.reporter, 3, 1, "Checking whether valid link {} -> {} is owned by stow", node_path, link_dest);
            if let Some(owner) = self.owning_package(&node_path, &link_dest)? {
                report!(self.reporter, 2, 0, "--- removing link owned by {}: {} => {}", owner, node_path, resolved);
                self.ledger.do_unlink(&node_path)?;
            }
        }
        Ok(())
    }

    /// Returns the package directory `target_subdir` could be replaced by a
    /// link to: all its remaining entries must be links sharing one parent
    /// directory, and that directory must belong to stow.
    pub(crate) fn foldable(&self, target_subdir: &str) -> Result<Option<String>> {
        report!(self.reporter, 3, 2, "Is {} foldable?", target_subdir);

        if self.config.no_folding {
            report!(self.reporter, 3, 3, "Not foldable because --no-folding enabled");
            return Ok(None);
        }

        let mut parent_in_pkg: Option<String> = None;
        for node in fs_utils::read_dir_sorted(target_subdir)? {
            let node_path = join_paths(&[target_subdir, &node]);
            if !self.ledger.is_a_node(&node_path)? {
                continue;
            }
            if !self.ledger.is_a_link(&node_path)? {
                report!(self.reporter, 3, 3, "Not foldable because {} not a link", node_path);
                return Ok(None);
            }

            let link_dest = self.ledger.read_a_link(&node_path)?;
            if link_dest.is_empty() {
                return Err(StowError::UnreadableLink(node_path).into());
            }

            let new_parent = parent(&link_dest);
            if let Some(existing) = parent_in_pkg.as_ref().filter(|p| **p != new_parent) {
                report!(
                    self.reporter,
                    3,
                    3,
                    "Not foldable because {} contains links to entries in both {} and {}",
                    target_subdir,
                    existing,
                    new_parent
                );
                return Ok(None);
            }
            parent_in_pkg.get_or_insert(new_parent);
        }

        let Some(parent_in_pkg) = parent_in_pkg.filter(|p| !p.is_empty()) else {
            report!(self.reporter, 3, 3, "Not foldable because {} contains no links", target_subdir);
            return Ok(None);
        };

        // The links sit one level deeper than the folded link will.
        let parent_in_pkg = parent_in_pkg
            .strip_prefix("../")
            .map(str::to_string)
            .unwrap_or(parent_in_pkg);

        if self.owning_package(target_subdir, &parent_in_pkg)?.is_some() {
            report!(self.reporter, 3, 3, "{} is foldable", target_subdir);
            Ok(Some(parent_in_pkg))
        } else {
            report!(self.reporter, 3, 3, "{} is not foldable", target_subdir);
            Ok(None)
        }
    }

    /// Replaces the directory `target_subdir` with a link to `pkg_subpath`.
    pub(crate) fn fold_tree(&mut self, target_subdir: &str, pkg_subpath: &str) -> Result<()> {
        report!(self.reporter, 3, 0, "--- Folding tree: {} => {}", target_subdir, pkg_subpath);

        for node in fs_utils::read_dir_sorted(target_subdir)? {
            let node_path = join_paths(&[target_subdir, &node]);
            if self.ledger.is_a_node(&node_path)? {
                self.ledger.do_unlink(&node_path)?;
            }
        }
        self.ledger.do_rmdir(target_subdir)?;
        self.ledger.do_link(pkg_subpath, target_subdir)
    }
}
