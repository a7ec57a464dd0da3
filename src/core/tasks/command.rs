use serde::Deserialize;

use super::{target_config, TaskOutcome, COMMANDS_KEY};
use crate::error::{Error, Result, TaskCommandFailedDetails};
use crate::project::Project;
use crate::ssh::execute_local_command_in_dir;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum LocalCommand {
    Line(String),
    Spec {
        command: String,
        #[serde(default)]
        cwd: Option<String>,
    },
}

/// Run `commands.<name>` through the local shell from the project root.
pub(super) fn run(project: &Project, name: &str) -> Result<TaskOutcome> {
    let (command, cwd) = match target_config::<LocalCommand>(&project.config, COMMANDS_KEY, name)? {
        LocalCommand::Line(command) => (command, None),
        LocalCommand::Spec { command, cwd } => (command, cwd),
    };

    let dir = match cwd {
        Some(cwd) => project.layout.resolve(cwd),
        None => project.layout.root.clone(),
    };

    log_status!("command", "{} (in {})", command, dir.display());
    let output = execute_local_command_in_dir(&command, Some(&dir));

    if !output.success {
        return Err(Error::task_command_failed(TaskCommandFailedDetails {
            task: name.to_string(),
            command,
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        }));
    }

    Ok(TaskOutcome::message(format!("{} finished", name)))
}
