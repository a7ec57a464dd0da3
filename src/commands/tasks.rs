use clap::Args;
use rigger::environment::Environment;
use rigger::project::Project;
use rigger::tasks::{self, TaskStep, COMMANDS_KEY};
use serde::Serialize;

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct TasksArgs {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub name: String,
    pub tasks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<TaskStep>>,
    /// Why the pipeline cannot be planned with the current config.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TasksOutput {
    pub pipelines: Vec<PipelineOutput>,
    pub commands: Vec<String>,
}

pub fn run(_args: TasksArgs, global: &GlobalArgs) -> CmdResult<TasksOutput> {
    let project = Project::open(&global.dir, &Environment::from_process())?;
    let pipelines = project.pipelines()?;

    let outputs = pipelines
        .iter()
        .map(|(name, members)| {
            let (steps, error) = match tasks::plan(std::slice::from_ref(name), &pipelines, &project.config) {
                Ok(steps) => (Some(steps), None),
                Err(e) => (None, Some(e.message)),
            };
            PipelineOutput {
                name: name.clone(),
                tasks: members.clone(),
                steps,
                error,
            }
        })
        .collect();

    let commands = project
        .config
        .section(COMMANDS_KEY)
        .and_then(|c| c.as_object())
        .map(|c| c.keys().cloned().collect())
        .unwrap_or_default();

    Ok((
        TasksOutput {
            pipelines: outputs,
            commands,
        },
        0,
    ))
}
