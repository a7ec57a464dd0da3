use clap::Args;
use rigger::environment::Environment;
use rigger::project::Project;
use rigger::properties::BuildId;
use serde::Serialize;
use serde_json::Value;

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct PropsArgs {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropsOutput {
    pub environment: String,
    pub base_file: String,
    pub override_file: Option<String>,
    pub build_id: BuildId,
    pub properties: Value,
}

pub fn run(_args: PropsArgs, global: &GlobalArgs) -> CmdResult<PropsOutput> {
    let project = Project::open(&global.dir, &Environment::from_process())?;
    let resolved = &project.resolved;

    Ok((
        PropsOutput {
            environment: resolved.environment.clone(),
            base_file: project.layout.base_properties.display().to_string(),
            override_file: resolved
                .override_file
                .as_ref()
                .map(|p| p.display().to_string()),
            build_id: resolved.build_id,
            properties: resolved.properties.redacted(),
        },
        0,
    ))
}
