use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::GlobalArgs;

mod commands;
mod output;

use commands::{config, props, run, tasks};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "rigger")]
#[command(version = VERSION)]
#[command(about = "Build and deploy automation driven by environment properties")]
struct Cli {
    /// Project directory
    #[arg(long, global = true, default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tasks or pipelines
    Run(run::RunArgs),
    /// Show the resolved properties
    Props(props::PropsArgs),
    /// Show the expanded build configuration
    Config(config::ConfigArgs),
    /// List pipelines and their flattened steps
    Tasks(tasks::TasksArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs { dir: cli.dir };

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    if output::print_json_result(json_result).is_err() {
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
