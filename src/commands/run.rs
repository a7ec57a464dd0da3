use clap::Args;
use rigger::environment::Environment;
use rigger::project::Project;
use rigger::tasks::{self, RunSummary};

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct RunArgs {
    /// Tasks or pipelines to run, as `name` or `name:target` (default: `default`)
    pub tasks: Vec<String>,

    /// Print the flattened plan without executing anything
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(args: RunArgs, global: &GlobalArgs) -> CmdResult<RunSummary> {
    let project = Project::open(&global.dir, &Environment::from_process())?;
    let pipelines = project.pipelines()?;
    let steps = tasks::plan(&args.tasks, &pipelines, &project.config)?;

    let summary = tasks::run(&project, steps, args.dry_run)?;
    Ok((summary, 0))
}
