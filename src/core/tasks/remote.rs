use serde::{Deserialize, Serialize};

use super::clean::{expand_globs, Patterns};
use super::{target_config, TaskOutcome};
use crate::error::{Error, RemoteCommandFailedDetails, Result};
use crate::project::Project;
use crate::ssh::{CommandOutput, SshClient};
use crate::utils::shell;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SftpTarget {
    files: Patterns,
    /// Remote directory receiving the files.
    path: String,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default = "default_true")]
    create_directories: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SshExecTarget {
    Command(String),
    Commands(Vec<String>),
    Spec { command: Patterns },
}

impl SshExecTarget {
    fn into_commands(self) -> Vec<String> {
        match self {
            SshExecTarget::Command(c) => vec![c],
            SshExecTarget::Commands(list) => list,
            SshExecTarget::Spec { command } => command.into_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Upload {
    local: String,
    remote: String,
}

pub(super) fn run_sftp(project: &Project, client: &SshClient, target: &str) -> Result<TaskOutcome> {
    let config: SftpTarget = target_config(&project.config, "sftp", target)?;
    let base = match &config.cwd {
        Some(cwd) => project.layout.resolve(cwd),
        None => project.layout.root.clone(),
    };

    let files: Vec<_> = expand_globs(&base, &config.files.into_vec())?
        .into_iter()
        .filter(|p| p.is_file())
        .collect();
    if files.is_empty() {
        return Err(Error::deploy_upload_failed(
            format!("sftp.{}.files", target),
            "no local files matched",
        ));
    }

    if config.create_directories {
        let mkdir = format!("mkdir -p {}", shell::quote_path(&config.path));
        check_remote(client, &mkdir, client.execute(&mkdir))?;
    }

    let mut uploads = Vec::with_capacity(files.len());
    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        let remote = join_remote(&config.path, &name.to_string_lossy());

        log_status!("sftp", "Uploading {} -> {}:{}", file.display(), client.destination(), remote);
        let output = client.upload_file(&file, &remote);
        if !output.success {
            return Err(Error::deploy_upload_failed(file.display().to_string(), output.error_text()));
        }

        uploads.push(Upload {
            local: file.display().to_string(),
            remote,
        });
    }

    TaskOutcome::message(format!("Uploaded {} file(s) to {}", uploads.len(), client.host)).with_data(&uploads)
}

pub(super) fn run_sshexec(project: &Project, client: &SshClient, target: &str) -> Result<TaskOutcome> {
    let commands = target_config::<SshExecTarget>(&project.config, "sshexec", target)?.into_commands();

    let mut last = String::new();
    for command in &commands {
        log_status!("sshexec", "{}: {}", client.destination(), command);
        let output = client.execute(command);
        last = check_remote(client, command, output)?.stdout;
    }

    Ok(TaskOutcome {
        message: format!("Ran {} command(s) on {}", commands.len(), client.host),
        data: (!last.trim().is_empty()).then(|| serde_json::Value::String(last.trim().to_string())),
    })
}

fn check_remote(client: &SshClient, command: &str, output: CommandOutput) -> Result<CommandOutput> {
    if output.success {
        return Ok(output);
    }
    Err(Error::remote_command_failed(RemoteCommandFailedDetails {
        command: command.to_string(),
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
        host: client.host.clone(),
    }))
}

fn join_remote(dir: &str, file: &str) -> String {
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), file)
    }
}
