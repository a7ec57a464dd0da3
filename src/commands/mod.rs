use std::path::PathBuf;

pub type CmdResult<T> = rigger::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    /// Project directory holding the property and build files.
    pub dir: PathBuf,
}

pub mod config;
pub mod props;
pub mod run;
pub mod tasks;

macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (rigger::Result<serde_json::Value>, i32) {
    match command {
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Props(args) => dispatch!(args, global, props),
        crate::Commands::Config(args) => dispatch!(args, global, config),
        crate::Commands::Tasks(args) => dispatch!(args, global, tasks),
    }
}
