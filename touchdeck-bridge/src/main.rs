use std::process::ExitCode;

use clap::Parser;

use touchdeck_bridge::cli::Cli;
use touchdeck_bridge::{demo, init_logging, run_application};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match cli.launch_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("touchdeck: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config, std::io::stderr);

    match run_application(config, |panel, env| demo::build(&cli, panel, env)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
