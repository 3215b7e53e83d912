use crate::error::{FsError, Result, RustowError, StowError};
use crate::fs_utils;
use crate::logging::Reporter;
use crate::paths::join_paths;
use crate::report;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskAction {
    Create,
    Remove,
    Move,
    /// A cancelled task. Stays in the list but is never executed.
    Skip,
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskAction::Create => "create",
            TaskAction::Remove => "remove",
            TaskAction::Move => "move",
            TaskAction::Skip => "skip",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Link,
    Dir,
    File,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Link => "link",
            TaskKind::Dir => "dir",
            TaskKind::File => "file",
        };
        f.write_str(name)
    }
}

/// One planned filesystem operation. Paths are relative to the target
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub action: TaskAction,
    pub kind: TaskKind,
    pub path: String,
    /// Link destination, for link tasks.
    pub source: Option<String>,
    /// Move destination, for file moves.
    pub dest: Option<String>,
}

impl Task {
    fn link(action: TaskAction, path: &str, source: &str) -> Self {
        Self {
            action,
            kind: TaskKind::Link,
            path: path.to_string(),
            source: Some(source.to_string()),
            dest: None,
        }
    }

    fn dir(action: TaskAction, path: &str) -> Self {
        Self {
            action,
            kind: TaskKind::Dir,
            path: path.to_string(),
            source: None,
            dest: None,
        }
    }

    pub fn source(&self) -> &str {
        self.source.as_deref().unwrap_or_default()
    }

    pub fn dest(&self) -> &str {
        self.dest.as_deref().unwrap_or_default()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.source, &self.dest) {
            (TaskKind::Link, Some(source), _) => {
                write!(f, "{} link {} => {}", self.action, self.path, source)
            },
            (TaskKind::File, _, Some(dest)) => {
                write!(f, "{} file {} -> {}", self.action, self.path, dest)
            },
            _ => write!(f, "{} {} {}", self.action, self.kind, self.path),
        }
    }
}

/// Ordered list of planned tasks, with per-path indexes for links and
/// directories.
///
/// Scheduling an operation that undoes a pending one cancels both: the
/// pending task becomes [`TaskAction::Skip`] and leaves its index. Requests
/// that could only come from a planner bug are reported as
/// [`RustowError::Internal`].
///
/// The query methods answer "what will this path be once every pending task
/// has run?", falling back to the real filesystem. Paths are resolved
/// against the working directory, which the planner keeps at the target.
#[derive(Debug, Default)]
pub struct TaskLedger {
    tasks: Vec<Task>,
    link_task_for: HashMap<String, usize>,
    dir_task_for: HashMap<String, usize>,
    reporter: Reporter,
}

impl TaskLedger {
    pub fn new(reporter: Reporter) -> Self {
        Self {
            reporter,
            ..Self::default()
        }
    }

    /// Every task, cancelled ones included, in scheduling order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn live_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.action != TaskAction::Skip)
    }

    pub fn is_empty(&self) -> bool {
        self.live_tasks().next().is_none()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
        self.link_task_for.clear();
        self.dir_task_for.clear();
    }

    pub fn link_task(&self, path: &str) -> Option<&Task> {
        self.link_task_for.get(path).map(|&i| &self.tasks[i])
    }

    pub fn dir_task(&self, path: &str) -> Option<&Task> {
        self.dir_task_for.get(path).map(|&i| &self.tasks[i])
    }

    fn push(&mut self, task: Task) -> usize {
        self.tasks.push(task);
        self.tasks.len() - 1
    }

    fn link_task_action_unchecked(&self, path: &str) -> Option<TaskAction> {
        self.link_task(path).map(|t| t.action)
    }

    fn dir_task_action_unchecked(&self, path: &str) -> Option<TaskAction> {
        self.dir_task(path).map(|t| t.action)
    }

    fn cancel_link(&mut self, path: &str) {
        if let Some(i) = self.link_task_for.remove(path) {
            self.tasks[i].action = TaskAction::Skip;
        }
    }

    fn cancel_dir(&mut self, path: &str) {
        if let Some(i) = self.dir_task_for.remove(path) {
            self.tasks[i].action = TaskAction::Skip;
        }
    }

    /// Schedules creation of a link at `path` pointing to `dest`.
    pub fn do_link(&mut self, dest: &str, path: &str) -> Result<()> {
        if let Some(task) = self.dir_task(path) {
            match task.action {
                TaskAction::Create => {
                    return Err(RustowError::internal(format!(
                        "new link ({} => {}) clashes with planned new directory",
                        path, dest
                    )));
                },
                TaskAction::Remove => {},
                other => return Err(bad_action(other)),
            }
        }

        let planned = self
            .link_task(path)
            .map(|task| (task.action, task.source().to_string()));
        if let Some((action, source)) = planned {
            match action {
                TaskAction::Create if source != dest => {
                    return Err(RustowError::internal(format!(
                        "new link clashes with planned new link: {} => {}",
                        path, source
                    )));
                },
                TaskAction::Create => {
                    report!(self.reporter, 1, 0, "LINK: {} => {} (duplicates previous action)", path, dest);
                    return Ok(());
                },
                TaskAction::Remove if source == dest => {
                    report!(self.reporter, 1, 0, "LINK: {} => {} (reverts previous action)", path, dest);
                    self.cancel_link(path);
                    return Ok(());
                },
                TaskAction::Remove => {},
                other => return Err(bad_action(other)),
            }
        }

        report!(self.reporter, 1, 0, "LINK: {} => {}", path, dest);
        let index = self.push(Task::link(TaskAction::Create, path, dest));
        self.link_task_for.insert(path.to_string(), index);
        Ok(())
    }

    /// Schedules removal of the link at `path`. The link's current
    /// destination is read from disk and recorded on the task.
    pub fn do_unlink(&mut self, path: &str) -> Result<()> {
        if let Some(action) = self.link_task_action_unchecked(path) {
            match action {
                TaskAction::Remove => {
                    report!(self.reporter, 1, 0, "UNLINK: {} (duplicates previous action)", path);
                    return Ok(());
                },
                TaskAction::Create => {
                    report!(self.reporter, 1, 0, "UNLINK: {} (reverts previous action)", path);
                    self.cancel_link(path);
                    return Ok(());
                },
                other => return Err(bad_action(other)),
            }
        }

        if let Some(task) = self.dir_task(path) {
            if task.action == TaskAction::Create {
                return Err(RustowError::internal(format!(
                    "new unlink operation clashes with planned operation: {} dir {}",
                    task.action, path
                )));
            }
        }

        report!(self.reporter, 1, 0, "UNLINK: {}", path);
        let source = fs_utils::read_link(path)?;
        let index = self.push(Task::link(TaskAction::Remove, path, &source));
        self.link_task_for.insert(path.to_string(), index);
        Ok(())
    }

    pub fn do_mkdir(&mut self, path: &str) -> Result<()> {
        if let Some(task) = self.link_task(path) {
            match task.action {
                TaskAction::Create => {
                    return Err(RustowError::internal(format!(
                        "new dir clashes with planned new link ({} => {})",
                        task.path,
                        task.source()
                    )));
                },
                TaskAction::Remove => {},
                other => return Err(bad_action(other)),
            }
        }

        if let Some(action) = self.dir_task_action_unchecked(path) {
            match action {
                TaskAction::Create => {
                    report!(self.reporter, 1, 0, "MKDIR: {} (duplicates previous action)", path);
                    return Ok(());
                },
                TaskAction::Remove => {
                    report!(self.reporter, 1, 0, "MKDIR: {} (reverts previous action)", path);
                    self.cancel_dir(path);
                    return Ok(());
                },
                other => return Err(bad_action(other)),
            }
        }

        report!(self.reporter, 1, 0, "MKDIR: {}", path);
        let index = self.push(Task::dir(TaskAction::Create, path));
        self.dir_task_for.insert(path.to_string(), index);
        Ok(())
    }

    pub fn do_rmdir(&mut self, path: &str) -> Result<()> {
        if let Some(task) = self.link_task(path) {
            return Err(RustowError::internal(format!(
                "rmdir clashes with planned operation: {} link {} => {}",
                task.action,
                task.path,
                task.source()
            )));
        }

        if let Some(action) = self.dir_task_action_unchecked(path) {
            match action {
                TaskAction::Remove => {
                    report!(self.reporter, 1, 0, "RMDIR {} (duplicates previous action)", path);
                    return Ok(());
                },
                TaskAction::Create => {
                    report!(self.reporter, 1, 0, "RMDIR {} (reverts previous action)", path);
                    self.cancel_dir(path);
                    return Ok(());
                },
                other => return Err(bad_action(other)),
            }
        }

        report!(self.reporter, 1, 0, "RMDIR {}", path);
        let index = self.push(Task::dir(TaskAction::Remove, path));
        self.dir_task_for.insert(path.to_string(), index);
        Ok(())
    }

    /// Schedules moving the plain file `src` to `dst`. Moves are not indexed.
    pub fn do_mv(&mut self, src: &str, dst: &str) -> Result<()> {
        if let Some(task) = self.link_task(src) {
            return Err(RustowError::internal(format!(
                "do_mv: pre-existing link task for {}; action: {}, source: {}",
                src,
                task.action,
                task.source()
            )));
        }
        if let Some(task) = self.dir_task(src) {
            return Err(RustowError::internal(format!(
                "do_mv: pre-existing dir task for {}?! action: {}",
                src, task.action
            )));
        }

        report!(self.reporter, 1, 0, "MV: {} -> {}", src, dst);
        self.push(Task {
            action: TaskAction::Move,
            kind: TaskKind::File,
            path: src.to_string(),
            source: None,
            dest: Some(dst.to_string()),
        });
        Ok(())
    }

    pub fn link_task_action(&self, path: &str) -> Result<Option<TaskAction>> {
        checked_action(self.link_task(path))
    }

    pub fn dir_task_action(&self, path: &str) -> Result<Option<TaskAction>> {
        checked_action(self.dir_task(path))
    }

    /// True if `path` itself or any of its ancestors is a link scheduled
    /// for removal.
    pub fn is_parent_link_scheduled_for_removal(&self, path: &str) -> bool {
        let mut prefix = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            prefix = join_paths(&[&prefix, part]);
            if self
                .link_task(&prefix)
                .is_some_and(|task| task.action == TaskAction::Remove)
            {
                report!(self.reporter, 4, 4, "| parent_link_scheduled_for_removal({}): link scheduled for removal", path);
                return true;
            }
        }
        false
    }

    pub fn is_a_link(&self, path: &str) -> Result<bool> {
        match self.link_task_action(path)? {
            Some(TaskAction::Remove) => return Ok(false),
            Some(TaskAction::Create) => return Ok(true),
            _ => {},
        }
        if fs_utils::is_symlink(path) {
            report!(self.reporter, 4, 2, "is_a_link({}): is a real link", path);
            return Ok(!self.is_parent_link_scheduled_for_removal(path));
        }
        Ok(false)
    }

    pub fn is_a_dir(&self, path: &str) -> Result<bool> {
        match self.dir_task_action(path)? {
            Some(TaskAction::Remove) => return Ok(false),
            Some(TaskAction::Create) => return Ok(true),
            _ => {},
        }
        if self.is_parent_link_scheduled_for_removal(path) {
            return Ok(false);
        }
        Ok(fs_utils::is_directory(path))
    }

    pub fn is_a_node(&self, path: &str) -> Result<bool> {
        use TaskAction::{Create, Remove};

        let link_action = self.link_task_action(path)?;
        let dir_action = self.dir_task_action(path)?;

        match (link_action, dir_action) {
            (Some(Remove), Some(Remove)) => {
                return Err(RustowError::internal(format!("removing link and dir: {}", path)));
            },
            (Some(Create), Some(Create)) => {
                return Err(RustowError::internal(format!("creating link and dir: {}", path)));
            },
            // Unfolding: the link goes before the directory is created.
            (Some(Remove), Some(Create)) => return Ok(true),
            (Some(Remove), None) => return Ok(false),
            (Some(Create), _) => return Ok(true),
            (None, Some(Remove)) => return Ok(false),
            (None, Some(Create)) => return Ok(true),
            _ => {},
        }

        if self.is_parent_link_scheduled_for_removal(path) {
            return Ok(false);
        }
        Ok(fs_utils::path_exists(path))
    }

    /// Destination of a current or planned link.
    pub fn read_a_link(&self, path: &str) -> Result<String> {
        match self.link_task_action(path)? {
            Some(TaskAction::Create) => {
                return Ok(self.link_task(path).map(|t| t.source().to_string()).unwrap_or_default());
            },
            Some(_) => {
                return Err(RustowError::internal(format!(
                    "read_a_link() passed a path that is scheduled for removal: {}",
                    path
                )));
            },
            None => {},
        }
        if fs_utils::is_symlink(path) {
            return fs_utils::read_link(path).map_err(|e| link_read_error(path, e));
        }
        Err(RustowError::internal(format!(
            "read_a_link() passed a non-link path: {}",
            path
        )))
    }
}

fn link_read_error(path: &str, error: RustowError) -> RustowError {
    match error {
        RustowError::Fs(FsError::ReadSymlink { source, .. }) => StowError::ReadLink {
            path: path.to_string(),
            source,
        }
        .into(),
        other => other,
    }
}

fn bad_action(action: TaskAction) -> RustowError {
    RustowError::internal(format!("bad task action: {}", action))
}

fn checked_action(task: Option<&Task>) -> Result<Option<TaskAction>> {
    match task.map(|t| t.action) {
        None => Ok(None),
        Some(action @ (TaskAction::Create | TaskAction::Remove)) => Ok(Some(action)),
        Some(other) => Err(bad_action(other)),
    }
}
