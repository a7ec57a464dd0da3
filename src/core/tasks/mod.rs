//! Task references, pipeline planning and sequential execution.
//!
//! A run is a list of task references (`name` or `name:target`). Pipeline
//! names are flattened into their members; every other name resolves to a
//! built-in task kind or to a local command declared under `commands`.

mod assets;
mod clean;
mod command;
mod compress;
mod remote;
mod target;

pub use compress::{build_archive, ArchiveReport, CompressConfig};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::project::{BuildConfig, Project};
use crate::properties::BuildId;
use crate::ssh::{SshClient, SshSettings};

/// Pipeline run when no task is requested.
pub const DEFAULT_TASK: &str = "default";

/// Config key holding local command definitions.
pub const COMMANDS_KEY: &str = "commands";

/// Section key shared by all targets; never a target itself.
const OPTIONS_KEY: &str = "options";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub name: String,
    pub target: Option<String>,
}

impl TaskRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (name, target) = match raw.split_once(':') {
            Some((name, target)) => (name, Some(target)),
            None => (raw, None),
        };

        if name.is_empty() {
            return Err(Error::validation_invalid_argument(
                "task",
                "Task name cannot be empty",
                Some(raw.to_string()),
            ));
        }
        if target.is_some_and(str::is_empty) {
            return Err(Error::validation_invalid_argument(
                "task",
                "Task target cannot be empty",
                Some(raw.to_string()),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            target: target.map(String::from),
        })
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{}:{}", self.name, target),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Clean,
    Compress,
    TargetFolder,
    TsConfig,
    PostClean,
    Sftp,
    SshExec,
    Command,
}

impl TaskKind {
    fn builtin(name: &str) -> Option<Self> {
        match name {
            "clean" => Some(Self::Clean),
            "compress" => Some(Self::Compress),
            "targetfolder" => Some(Self::TargetFolder),
            "tsconfig" => Some(Self::TsConfig),
            "postclean" => Some(Self::PostClean),
            "sftp" => Some(Self::Sftp),
            "sshexec" => Some(Self::SshExec),
            _ => None,
        }
    }

    /// Kinds configured per target in a section of the same name.
    fn is_multi_target(self) -> bool {
        matches!(self, Self::Clean | Self::Compress | Self::Sftp | Self::SshExec)
    }
}

/// One concrete unit of work in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStep {
    pub task: String,
    pub kind: TaskKind,
    #[serde(skip)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl TaskStep {
    fn new(kind: TaskKind, name: &str, target: Option<&str>) -> Self {
        let reference = TaskRef {
            name: name.to_string(),
            target: target.map(String::from),
        };
        Self {
            task: reference.to_string(),
            kind,
            name: reference.name,
            target: reference.target,
        }
    }

    fn target_or_err(&self) -> Result<&str> {
        self.target
            .as_deref()
            .ok_or_else(|| Error::internal_unexpected(format!("Task '{}' was planned without a target", self.task)))
    }
}

/// Flatten `requested` (or the default pipeline) into concrete steps.
pub fn plan(
    requested: &[String],
    pipelines: &BTreeMap<String, Vec<String>>,
    config: &BuildConfig,
) -> Result<Vec<TaskStep>> {
    let mut planner = Planner {
        pipelines,
        config,
        steps: Vec::new(),
        stack: Vec::new(),
    };

    if requested.is_empty() {
        planner.add(DEFAULT_TASK)?;
    } else {
        for raw in requested {
            planner.add(raw)?;
        }
    }

    Ok(planner.steps)
}

struct Planner<'a> {
    pipelines: &'a BTreeMap<String, Vec<String>>,
    config: &'a BuildConfig,
    steps: Vec<TaskStep>,
    stack: Vec<String>,
}

impl<'a> Planner<'a> {
    fn add(&mut self, raw: &str) -> Result<()> {
        let reference = TaskRef::parse(raw)?;
        let pipelines = self.pipelines;

        if let Some(members) = pipelines.get(&reference.name) {
            if reference.target.is_some() {
                return Err(Error::validation_invalid_argument(
                    "task",
                    format!("Pipeline '{}' does not take a target", reference.name),
                    Some(raw.to_string()),
                ));
            }
            if let Some(pos) = self.stack.iter().position(|n| n == &reference.name) {
                let mut chain = self.stack[pos..].to_vec();
                chain.push(reference.name);
                return Err(Error::task_cycle(chain));
            }

            self.stack.push(reference.name);
            for member in members {
                self.add(member)?;
            }
            self.stack.pop();
            return Ok(());
        }

        let kind = TaskKind::builtin(&reference.name)
            .or_else(|| self.has_command(&reference.name).then_some(TaskKind::Command))
            .ok_or_else(|| Error::task_unknown(reference.to_string()))?;

        if !kind.is_multi_target() {
            if reference.target.is_some() {
                return Err(Error::validation_invalid_argument(
                    "task",
                    format!("Task '{}' does not take a target", reference.name),
                    Some(raw.to_string()),
                ));
            }
            self.steps.push(TaskStep::new(kind, &reference.name, None));
            return Ok(());
        }

        let targets = section_targets(self.config, &reference.name);
        match &reference.target {
            Some(target) => {
                if !targets.iter().any(|t| t == target) {
                    return Err(Error::task_unknown(reference.to_string()));
                }
                self.steps.push(TaskStep::new(kind, &reference.name, Some(target)));
            }
            None => {
                if targets.is_empty() {
                    return Err(Error::task_unknown(reference.to_string())
                        .with_hint(format!("Add at least one target under '{}' in the build config", reference.name)));
                }
                for target in targets {
                    self.steps.push(TaskStep::new(kind, &reference.name, Some(&target)));
                }
            }
        }
        Ok(())
    }

    fn has_command(&self, name: &str) -> bool {
        self.config
            .section(COMMANDS_KEY)
            .and_then(|commands| commands.get(name))
            .is_some()
    }
}

/// Target names of a section, in declaration order.
fn section_targets(config: &BuildConfig, section: &str) -> Vec<String> {
    match config.section(section) {
        Some(Value::Object(map)) => map
            .keys()
            .filter(|k| k.as_str() != OPTIONS_KEY)
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

/// Deserialize the config of `section.target`.
fn target_config<T: DeserializeOwned>(config: &BuildConfig, section: &str, target: &str) -> Result<T> {
    let key = format!("{}.{}", section, target);
    let value = config
        .section(section)
        .and_then(|s| s.get(target))
        .ok_or_else(|| Error::config_missing_key(key.clone(), None))?;

    serde_json::from_value(value.clone())
        .map_err(|e| Error::config_invalid_value(key, Some(value.to_string()), e.to_string()))
}

/// Result of a single executed task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl TaskOutcome {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    fn with_data<T: Serialize>(mut self, data: &T) -> Result<Self> {
        let value = serde_json::to_value(data)
            .map_err(|e| Error::internal_json(e.to_string(), Some("serialize task result".to_string())))?;
        self.data = Some(value);
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Planned,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    #[serde(flatten)]
    pub step: TaskStep,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TaskOutcome>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTotals {
    pub total: u32,
    pub completed: u32,
}

/// Report of a whole run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub environment: String,
    pub build_id: BuildId,
    pub dry_run: bool,
    pub steps: Vec<StepReport>,
    pub summary: RunTotals,
}

/// Executes steps against one project, opening the SSH client on first use.
pub struct TaskRunner<'a> {
    project: &'a Project,
    ssh: Option<SshClient>,
}

impl<'a> TaskRunner<'a> {
    pub fn new(project: &'a Project) -> Self {
        Self { project, ssh: None }
    }

    fn ssh(&mut self) -> Result<&SshClient> {
        if self.ssh.is_none() {
            let settings = SshSettings::from_props(self.project.config.props())?;
            self.ssh = Some(SshClient::from_settings(&settings, &self.project.defaults.deploy)?);
        }
        self.ssh
            .as_ref()
            .ok_or_else(|| Error::internal_unexpected("SSH client unavailable"))
    }

    pub fn run_step(&mut self, step: &TaskStep) -> Result<TaskOutcome> {
        let project = self.project;
        match step.kind {
            TaskKind::Clean => clean::run(project, step.target_or_err()?),
            TaskKind::Compress => compress::run(project, step.target_or_err()?),
            TaskKind::TargetFolder => target::run(project),
            TaskKind::TsConfig => assets::run_versioned(project),
            TaskKind::PostClean => assets::run_postclean(project),
            TaskKind::Sftp => {
                let target = step.target_or_err()?;
                let client = self.ssh()?;
                remote::run_sftp(project, client, target)
            }
            TaskKind::SshExec => {
                let target = step.target_or_err()?;
                let client = self.ssh()?;
                remote::run_sshexec(project, client, target)
            }
            TaskKind::Command => command::run(project, &step.name),
        }
    }
}

/// Run `steps` in order, stopping at the first failure.
pub fn run(project: &Project, steps: Vec<TaskStep>, dry_run: bool) -> Result<RunSummary> {
    let total = steps.len() as u32;
    let mut reports = Vec::with_capacity(steps.len());
    let mut completed = 0;

    if dry_run {
        reports.extend(steps.into_iter().map(|step| StepReport {
            step,
            status: StepStatus::Planned,
            outcome: None,
        }));
    } else {
        let mut runner = TaskRunner::new(project);
        for (index, step) in steps.into_iter().enumerate() {
            log_status!("run", "[{}/{}] {}", index + 1, total, step.task);

            let outcome = runner.run_step(&step).map_err(|e| {
                e.with_hint(format!(
                    "Stopped at step {}/{} ({}); {} step(s) completed",
                    index + 1,
                    total,
                    step.task,
                    completed
                ))
            })?;

            log_status!("run", "{}", outcome.message);
            completed += 1;
            reports.push(StepReport {
                step,
                status: StepStatus::Completed,
                outcome: Some(outcome),
            });
        }
    }

    Ok(RunSummary {
        environment: project.resolved.environment.clone(),
        build_id: project.resolved.build_id,
        dry_run,
        steps: reports,
        summary: RunTotals { total, completed },
    })
}


#[cfg(test)]
pub(crate) mod fixtures {
    use crate::environment::Environment;
    use crate::project::Project;
    use std::fs;
    use std::path::Path;

    /// Write `props.yml` and `build.yml` into `root` and open the project.
    pub fn project(root: &Path, props: &str, build: &str) -> Project {
        fs::write(root.join("props.yml"), props).unwrap();
        fs::write(root.join("build.yml"), build).unwrap();
        Project::open(root, &Environment::from_pairs([("BUILD_NUMBER", "42")])).unwrap()
    }
}
