use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigLoadFailed,
    ConfigInvalidYaml,
    ConfigInvalidJson,
    ConfigMissingKey,
    ConfigInvalidValue,

    SecretLoadFailed,
    TemplateUnresolved,
    TargetPathInvalid,

    ValidationInvalidArgument,

    TaskUnknown,
    TaskCycle,
    TaskCommandFailed,
    ArchiveFailed,

    SshIdentityFileNotFound,
    RemoteCommandFailed,
    DeployUploadFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigLoadFailed => "config.load_failed",
            ErrorCode::ConfigInvalidYaml => "config.invalid_yaml",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::SecretLoadFailed => "secret.load_failed",
            ErrorCode::TemplateUnresolved => "template.unresolved",
            ErrorCode::TargetPathInvalid => "target.path_invalid",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::TaskUnknown => "task.unknown",
            ErrorCode::TaskCycle => "task.cycle",
            ErrorCode::TaskCommandFailed => "task.command_failed",
            ErrorCode::ArchiveFailed => "archive.failed",

            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",
            ErrorCode::RemoteCommandFailed => "remote.command_failed",
            ErrorCode::DeployUploadFailed => "deploy.upload_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileErrorDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateUnresolvedDetails {
    pub path: String,
    pub expression: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCommandFailedDetails {
    pub task: String,
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub host: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn config_load_failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigLoadFailed,
            format!("Cannot load configuration file {}", path),
            to_details(FileErrorDetails {
                path,
                error: error.into(),
            }),
        )
    }

    pub fn config_invalid_yaml(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigInvalidYaml,
            format!("Invalid YAML in {}", path),
            to_details(FileErrorDetails {
                path,
                error: error.into(),
            }),
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigInvalidJson,
            format!("Invalid JSON in {}", path),
            to_details(FileErrorDetails {
                path,
                error: err.to_string(),
            }),
        )
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::ConfigMissingKey,
            format!("Missing required configuration key '{}'", key),
            to_details(ConfigMissingKeyDetails { key, path }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid configuration value for '{}': {}", key, problem),
            to_details(ConfigInvalidValueDetails {
                key,
                value,
                problem,
            }),
        )
    }

    pub fn secret_load_failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::SecretLoadFailed,
            format!("Cannot read secret file {}", path),
            to_details(FileErrorDetails {
                path,
                error: error.into(),
            }),
        )
    }

    pub fn template_unresolved(path: impl Into<String>, expression: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::TemplateUnresolved,
            format!("Unresolved template path '{}'", path),
            to_details(TemplateUnresolvedDetails {
                path,
                expression: expression.into(),
            }),
        )
    }

    pub fn target_path_invalid(path: impl Into<String>, problem: impl Into<String>) -> Self {
        let path = path.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::TargetPathInvalid,
            format!("{}: {}", problem, path),
            to_details(FileErrorDetails {
                path,
                error: problem,
            }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            to_details(InvalidArgumentDetails {
                field: field.into(),
                problem: problem.into(),
                id,
            }),
        )
    }

    pub fn task_unknown(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::TaskUnknown,
            format!("Unknown task '{}'", name),
            serde_json::json!({ "task": name }),
        )
        .with_hint("Run 'rigger tasks' to see available pipelines")
    }

    pub fn task_cycle(chain: Vec<String>) -> Self {
        Self::new(
            ErrorCode::TaskCycle,
            format!("Pipeline cycle detected: {}", chain.join(" -> ")),
            serde_json::json!({ "chain": chain }),
        )
    }

    pub fn task_command_failed(details: TaskCommandFailedDetails) -> Self {
        let message = format!(
            "Task '{}' failed with exit code {}",
            details.task, details.exit_code
        );
        Self::new(ErrorCode::TaskCommandFailed, message, to_details(details))
    }

    pub fn archive_failed(archive: impl Into<String>, error: impl Into<String>) -> Self {
        let path = archive.into();
        Self::new(
            ErrorCode::ArchiveFailed,
            format!("Cannot create archive {}", path),
            to_details(FileErrorDetails {
                path,
                error: error.into(),
            }),
        )
    }

    pub fn ssh_identity_file_not_found(identity_file: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            "SSH identity file not found",
            serde_json::json!({ "identityFile": identity_file.into() }),
        )
    }

    pub fn remote_command_failed(details: RemoteCommandFailedDetails) -> Self {
        Self::new(
            ErrorCode::RemoteCommandFailed,
            "Remote command failed",
            to_details(details),
        )
    }

    pub fn deploy_upload_failed(file: impl Into<String>, error: impl Into<String>) -> Self {
        let path = file.into();
        Self::new(
            ErrorCode::DeployUploadFailed,
            format!("Upload failed for {}", path),
            to_details(FileErrorDetails {
                path,
                error: error.into(),
            }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            to_details(InternalErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_unresolved_names_the_path() {
        let err = Error::template_unresolved("missing.path", "<<missing.path>>");
        assert_eq!(err.code.as_str(), "template.unresolved");
        assert!(err.message.contains("missing.path"));
        assert_eq!(err.details["path"], "missing.path");
        assert_eq!(err.details["expression"], "<<missing.path>>");
    }

    #[test]
    fn task_command_failed_serializes_camel_case() {
        let err = Error::task_command_failed(TaskCommandFailedDetails {
            task: "uglify".to_string(),
            command: "uglifyjs a.js".to_string(),
            exit_code: 127,
            stdout: String::new(),
            stderr: "not found".to_string(),
        });

        assert_eq!(err.details["exitCode"], 127);
        assert_eq!(err.details["stderr"], "not found");
        assert!(err.message.contains("uglify"));
    }

    #[test]
    fn with_hint_appends_in_order() {
        let err = Error::task_unknown("nope").with_hint("second");
        assert_eq!(err.hints.len(), 2);
        assert_eq!(err.hints[1].message, "second");
    }
}
