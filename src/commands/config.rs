use clap::Args;
use rigger::environment::Environment;
use rigger::project::Project;
use serde::Serialize;
use serde_json::Value;

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct ConfigArgs {
    /// Only show this top-level section
    #[arg(long)]
    pub section: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOutput {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub config: Value,
}

pub fn run(args: ConfigArgs, global: &GlobalArgs) -> CmdResult<ConfigOutput> {
    let project = Project::open(&global.dir, &Environment::from_process())?;
    let tree = project.config.redacted();

    let config = match &args.section {
        Some(name) => tree.get(name).cloned().ok_or_else(|| {
            rigger::Error::config_missing_key(name.clone(), Some(project.layout.build_config.display().to_string()))
        })?,
        None => tree,
    };

    Ok((
        ConfigOutput {
            file: project.layout.build_config.display().to_string(),
            section: args.section,
            config,
        },
        0,
    ))
}
