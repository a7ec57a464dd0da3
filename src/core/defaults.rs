use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File name of the optional per-project defaults file.
pub const DEFAULTS_FILE: &str = ".rigger.json";

/// All configurable defaults that can be overridden via .rigger.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Defaults {
    #[serde(default = "default_files")]
    pub files: FilesConfig,

    #[serde(default = "default_environment")]
    pub environment: EnvironmentConfig,

    #[serde(default = "default_pipelines")]
    pub pipelines: BTreeMap<String, Vec<String>>,

    #[serde(default = "default_deploy")]
    pub deploy: DeployConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            files: default_files(),
            environment: default_environment(),
            pipelines: default_pipelines(),
            deploy: default_deploy(),
        }
    }
}

/// Property and config file naming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesConfig {
    #[serde(default = "default_base_properties")]
    pub base_properties: String,

    /// Override file name; `{env}` is replaced by the environment label.
    #[serde(default = "default_override_pattern")]
    pub override_pattern: String,

    /// Directory holding override files, relative to the project root.
    #[serde(default)]
    pub overrides_dir: Option<String>,

    #[serde(default = "default_build_config")]
    pub build_config: String,
}

impl FilesConfig {
    pub fn override_file_name(&self, selector: &str) -> String {
        self.override_pattern.replace("{env}", selector)
    }
}

/// Environment variable lookups, each list in priority order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    #[serde(default = "default_selector_vars")]
    pub selector_vars: Vec<String>,

    #[serde(default = "default_build_number_vars")]
    pub build_number_vars: Vec<String>,

    #[serde(default = "default_label")]
    pub default_label: String,
}

/// Configuration for deploy operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    #[serde(default = "default_scp_flags")]
    pub scp_flags: Vec<String>,

    #[serde(default = "default_ssh_port")]
    pub default_ssh_port: u16,
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_files() -> FilesConfig {
    FilesConfig {
        base_properties: default_base_properties(),
        override_pattern: default_override_pattern(),
        overrides_dir: None,
        build_config: default_build_config(),
    }
}

fn default_base_properties() -> String {
    "props.yml".to_string()
}

fn default_override_pattern() -> String {
    "props.{env}.yml".to_string()
}

fn default_build_config() -> String {
    "build.yml".to_string()
}

fn default_environment() -> EnvironmentConfig {
    EnvironmentConfig {
        selector_vars: default_selector_vars(),
        build_number_vars: default_build_number_vars(),
        default_label: default_label(),
    }
}

fn default_selector_vars() -> Vec<String> {
    vec![
        "ENVIRONMENT".to_string(),
        "CONTEXT".to_string(),
        "TYPO3_CONTEXT".to_string(),
    ]
}

fn default_build_number_vars() -> Vec<String> {
    vec!["BUILD_NUMBER".to_string(), "BUILDNUMBER".to_string()]
}

fn default_label() -> String {
    "Production".to_string()
}

fn default_pipelines() -> BTreeMap<String, Vec<String>> {
    let mut pipelines = BTreeMap::new();
    pipelines.insert(
        "default".to_string(),
        ["clean", "uglify", "recess", "compress:build", "tsconfig"]
            .map(String::from)
            .to_vec(),
    );
    pipelines.insert(
        "deploy".to_string(),
        [
            "default",
            "compress:deploy",
            "sftp",
            "sshexec:unpack",
            "sshexec:replace",
            "sshexec:tempcached",
            "sshexec:dbtables",
            "sshexec:clearcaches",
            "postclean",
        ]
        .map(String::from)
        .to_vec(),
    );
    pipelines
}

fn default_deploy() -> DeployConfig {
    DeployConfig {
        scp_flags: default_scp_flags(),
        default_ssh_port: default_ssh_port(),
    }
}

fn default_scp_flags() -> Vec<String> {
    vec!["-O".to_string()]
}

fn default_ssh_port() -> u16 {
    22
}

// =============================================================================
// Loading functions
// =============================================================================

pub fn defaults_path(project_root: &Path) -> PathBuf {
    project_root.join(DEFAULTS_FILE)
}

/// Load defaults for a project, merging `.rigger.json` with built-in defaults.
/// A missing file yields built-in defaults; a malformed one is an error.
pub fn load_defaults(project_root: &Path) -> Result<Defaults> {
    let path = defaults_path(project_root);

    if !path.exists() {
        return Ok(Defaults::default());
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    serde_json::from_str(&content).map_err(|e| Error::config_invalid_json(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_builtin_defaults() {
        let dir = tempdir().unwrap();
        let defaults = load_defaults(dir.path()).unwrap();

        assert_eq!(defaults.files.base_properties, "props.yml");
        assert_eq!(defaults.environment.default_label, "Production");
        assert_eq!(defaults.pipelines["default"].len(), 5);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            defaults_path(dir.path()),
            r#"{"environment": {"selectorVars": ["APP_ENV"]}, "deploy": {"defaultSshPort": 2222}}"#,
        )
        .unwrap();

        let defaults = load_defaults(dir.path()).unwrap();

        assert_eq!(defaults.environment.selector_vars, vec!["APP_ENV".to_string()]);
        assert_eq!(defaults.environment.build_number_vars.len(), 2);
        assert_eq!(defaults.deploy.default_ssh_port, 2222);
        assert_eq!(defaults.deploy.scp_flags, vec!["-O".to_string()]);
        assert_eq!(defaults.files.build_config, "build.yml");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(defaults_path(dir.path()), "{not json").unwrap();

        let err = load_defaults(dir.path()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_json");
    }

    #[test]
    fn override_file_name_substitutes_label() {
        assert_eq!(
            Defaults::default().files.override_file_name("Development"),
            "props.Development.yml"
        );
    }
}
