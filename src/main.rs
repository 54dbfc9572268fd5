use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use deskpilot_lib::config::{load_config, load_config_from};
use deskpilot_lib::errors::DeskPilotResult;

/// Drive the desktop from a natural-language command.
#[derive(Debug, Parser)]
#[command(name = "deskpilot", version, about)]
struct Cli {
    /// Path to config.toml (default: next to the executable, then the working directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override agent.max_iterations for this run
    #[arg(long, value_name = "N")]
    max_iterations: Option<u32>,

    /// The command, e.g. "open Safari and search YouTube for lo-fi"
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    deskpilot_lib::init_tracing();
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "deskpilot failed to start");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> DeskPilotResult<bool> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(max) = cli.max_iterations {
        config.agent.max_iterations = max.max(1);
    }

    let engine = deskpilot_lib::build_engine(&config);
    let command = cli.command.join(" ");
    let result = engine.run(&command).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.success)
}
