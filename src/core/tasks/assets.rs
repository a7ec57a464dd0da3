use super::compress::configured_archive;
use super::TaskOutcome;
use crate::assets::{self, RewriteMode};
use crate::error::Result;
use crate::project::Project;
use crate::utils::io;

/// Archive removed by `postclean` when no `compress.deploy` target names one.
const DEFAULT_DEPLOY_ARCHIVE: &str = "current.tgz";

pub(super) fn run_versioned(project: &Project) -> Result<TaskOutcome> {
    rewrite(project, RewriteMode::Versioned(project.resolved.build_id))
}

/// Remove the deploy archive and reset asset references.
pub(super) fn run_postclean(project: &Project) -> Result<TaskOutcome> {
    let archive = configured_archive(project, "deploy")
        .unwrap_or_else(|| project.layout.resolve(DEFAULT_DEPLOY_ARCHIVE));

    if io::remove_path(&archive, "remove deploy archive")? {
        log_status!("postclean", "Removed {}", archive.display());
    }

    rewrite(project, RewriteMode::Reset)
}

fn rewrite(project: &Project, mode: RewriteMode) -> Result<TaskOutcome> {
    let file = project.typoscript_file();
    if assets::rewrite_file(file.as_deref(), mode)? {
        Ok(TaskOutcome::message(format!("Asset references {}", mode)))
    } else {
        Ok(TaskOutcome::message("No asset reference file configured"))
    }
}
