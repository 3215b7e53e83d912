use crate::error::{Result, RustowError};
use crate::fs_utils::{self, CwdGuard};
use crate::logging::Reporter;
use crate::report;
use crate::stow::Stower;
use crate::task::{Task, TaskAction, TaskKind};

impl Stower<'_> {
    /// Performs every live task in scheduling order, from inside the target
    /// directory. The first failure aborts the run; tasks already performed
    /// stay performed. After a successful run the ledger is empty.
    pub fn process_tasks(&mut self) -> Result<()> {
        let live: Vec<Task> = self.ledger.live_tasks().cloned().collect();
        report!(self.reporter, 2, 0, "Processing tasks...");
        if live.is_empty() {
            return Ok(());
        }

        let guard = CwdGuard::enter(&self.config.target, "target tree")?;
        for task in &live {
            execute_task(task, &self.reporter)?;
        }
        guard.restore()?;
        self.ledger.clear();

        report!(self.reporter, 2, 0, "Processing tasks... done");
        Ok(())
    }
}

fn execute_task(task: &Task, reporter: &Reporter) -> Result<()> {
    report!(reporter, 3, 1, "{}", task);
    match (task.action, task.kind) {
        (TaskAction::Create, TaskKind::Dir) => fs_utils::create_dir(&task.path),
        (TaskAction::Create, TaskKind::Link) => fs_utils::create_symlink(&task.path, task.source()),
        (TaskAction::Remove, TaskKind::Dir) => fs_utils::remove_dir(&task.path),
        (TaskAction::Remove, TaskKind::Link) => fs_utils::remove_link(&task.path),
        (TaskAction::Move, TaskKind::File) => fs_utils::move_file(&task.path, task.dest()),
        (action, _) => Err(RustowError::internal(format!("bad task action: {}", action))),
    }
}
