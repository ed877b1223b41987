//! xai-thinning command-line entry point

use clap::{CommandFactory, Parser};
use xai_thinning::cli::{cmd_info, cmd_run, Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xai_thinning=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { config, trials, output }) => {
            cmd_run(&config, trials, output.as_deref())?;
        }
        Some(Commands::Info { data }) => {
            cmd_info(&data)?;
        }
        None => {
            Cli::command().print_help()?;
        }
    }

    Ok(())
}
