mod cli;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use tfimport::{output, workflow};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Import(args) => {
            let settings = args.to_settings();
            let outcome = match workflow::run(&settings, &args.address, &args.id).await {
                Ok(outcome) => outcome,
                // NOTE: Input mistakes carry their own remediation text, skip the report
                Err(e) if e.is_user_error() => {
                    eprintln!("Error: {}", e);
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e.into()),
            };
            tracing::info!(
                count = outcome.imported.len(),
                serial = outcome.state.serial,
                "import complete"
            );
            println!("{}", output::success_message(&outcome.imported));
        }
    }

    Ok(ExitCode::SUCCESS)
}
