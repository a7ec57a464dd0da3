use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::process::Command;

use crate::defaults::DeployConfig;
use crate::error::{Error, Result};
use crate::utils::shell;

/// Connection settings read from the `props.ssh` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshSettings {
    pub host: String,
    #[serde(alias = "user")]
    pub username: String,
    #[serde(default)]
    pub port: Option<Value>,
    #[serde(default)]
    pub private_key_file: Option<String>,
}

impl SshSettings {
    pub fn from_props(props: &Value) -> Result<Self> {
        let section = props
            .get("ssh")
            .ok_or_else(|| Error::config_missing_key("ssh", Some("props".to_string())))?;

        serde_json::from_value(section.clone()).map_err(|e| {
            Error::config_invalid_value("props.ssh", None, e.to_string())
                .with_hint("props.ssh needs at least 'host' and 'username'")
        })
    }

    /// Port as configured; templated values arrive as strings.
    fn port(&self, default_port: u16) -> Result<u16> {
        match &self.port {
            None | Some(Value::Null) => Ok(default_port),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| Error::config_invalid_value("props.ssh.port", Some(n.to_string()), "not a TCP port")),
            Some(Value::String(s)) => s.trim().parse::<u16>().map_err(|_| {
                Error::config_invalid_value("props.ssh.port", Some(s.clone()), "not a TCP port")
            }),
            Some(other) => Err(Error::config_invalid_value(
                "props.ssh.port",
                Some(other.to_string()),
                "not a TCP port",
            )),
        }
    }
}

pub struct SshClient {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the host is localhost/127.0.0.1/::1.
    pub is_local: bool,
    scp_flags: Vec<String>,
    default_port: u16,
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    fn spawn_error(message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: message,
            success: false,
            exit_code: -1,
        }
    }

    /// Prefer stderr, fall back to stdout.
    pub fn error_text(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        }
    }
}

impl From<std::io::Result<std::process::Output>> for CommandOutput {
    fn from(output: std::io::Result<std::process::Output>) -> Self {
        match output {
            Ok(out) => Self {
                stdout: String::from_utf8_lossy(&out.stdout).to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).to_string(),
                success: out.status.success(),
                exit_code: out.status.code().unwrap_or(-1),
            },
            Err(e) => Self::spawn_error(format!("Command error: {}", e)),
        }
    }
}

impl SshClient {
    pub fn from_settings(settings: &SshSettings, deploy: &DeployConfig) -> Result<Self> {
        let identity_file = match &settings.private_key_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(expanded));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&settings.host);
        if is_local {
            log_status!("ssh", "Host '{}' is localhost, using local execution", settings.host);
        }

        Ok(Self {
            host: settings.host.clone(),
            user: settings.username.clone(),
            port: settings.port(deploy.default_ssh_port)?,
            identity_file,
            is_local,
            scp_flags: deploy.scp_flags.clone(),
            default_port: deploy.default_ssh_port,
        })
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != self.default_port {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        // Never prompt, and give up on stalled connections.
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args.push(self.destination());
        args.push(command.to_string());

        args
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn build_scp_args(&self, local_path: &Path, remote_path: &str) -> Vec<String> {
        let mut args = self.scp_flags.clone();

        if let Some(identity_file) = &self.identity_file {
            args.extend(["-i".to_string(), identity_file.clone()]);
        }

        if self.port != self.default_port {
            args.extend(["-P".to_string(), self.port.to_string()]);
        }

        args.push(local_path.to_string_lossy().to_string());
        args.push(format!("{}:{}", self.destination(), shell::quote_path(remote_path)));
        args
    }

    pub fn execute(&self, command: &str) -> CommandOutput {
        self.execute_with_retry(command, 3)
    }

    /// Copy a local file to `remote_path`.
    pub fn upload_file(&self, local_path: &Path, remote_path: &str) -> CommandOutput {
        if self.is_local {
            let cmd = format!(
                "cp {} {}",
                shell::quote_path(&local_path.to_string_lossy()),
                shell::quote_path(remote_path)
            );
            return execute_local_command(&cmd);
        }

        let args = self.build_scp_args(local_path, remote_path);
        Command::new("scp").args(&args).output().into()
    }

    fn execute_with_retry(&self, command: &str, max_attempts: u32) -> CommandOutput {
        retry_transient(
            max_attempts,
            || self.execute_once(command),
            |secs| std::thread::sleep(std::time::Duration::from_secs(secs)),
        )
    }

    fn execute_once(&self, command: &str) -> CommandOutput {
        if self.is_local {
            return execute_local_command(command);
        }

        let args = self.build_ssh_args(command);
        Command::new("ssh").args(&args).output().into()
    }
}

/// Run `attempt` until it succeeds, fails for a non-transient reason, or
/// `max_attempts` runs are used up. `wait` receives each backoff in seconds.
fn retry_transient(
    max_attempts: u32,
    mut attempt: impl FnMut() -> CommandOutput,
    mut wait: impl FnMut(u64),
) -> CommandOutput {
    let backoff_secs = [0, 2, 5]; // delays before retry 1, 2, 3
    let mut last = CommandOutput::spawn_error("SSH retry exhausted".to_string());

    for n in 0..max_attempts {
        let result = attempt();

        // Only retry on transient connection errors, not command failures
        if result.success || n + 1 >= max_attempts || !is_transient_ssh_error(&result) {
            return result;
        }

        let delay = backoff_secs.get(n as usize + 1).copied().unwrap_or(5);
        log_status!(
            "ssh",
            "Connection failed (attempt {}/{}), retrying in {}s...",
            n + 1,
            max_attempts,
            delay
        );
        wait(delay);
        last = result;
    }

    last
}

pub fn execute_local_command(command: &str) -> CommandOutput {
    execute_local_command_in_dir(command, None)
}

pub fn execute_local_command_in_dir(command: &str, current_dir: Option<&Path>) -> CommandOutput {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }

    cmd.output().into()
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Check if an SSH failure is a transient connection error worth retrying.
fn is_transient_ssh_error(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    // SSH exit code 255 = connection error (not a remote command failure)
    let is_connection_exit = output.exit_code == 255;

    let transient_patterns = [
        "connection refused",
        "connection reset",
        "connection timed out",
        "no route to host",
        "network is unreachable",
        "temporary failure in name resolution",
        "could not resolve hostname",
        "broken pipe",
        "ssh_exchange_identification",
        "connection closed by remote host",
    ];

    is_connection_exit || transient_patterns.iter().any(|p| stderr.contains(p))
}
