use agentlink::cli::{self, Cli, Command};
use agentlink::config::{Config, ConfigLoader};
use agentlink::utils::init_tracing;
use clap::Parser;
use std::process::ExitCode;
use tracing::debug;

/// Load the config file, apply CLI overrides and install the subscriber
async fn setup(cli: &Cli) -> anyhow::Result<Config> {
    let path = ConfigLoader::expand_path(&cli.config);
    let mut config = ConfigLoader::load(&path).await?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    init_tracing(&config.logging);
    debug!("Using config {}", path.display());
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let ok = match &cli.command {
        Command::Validate(args) => cli::validate(&cli.config, args).await?,
        Command::Discover(args) => {
            let config = setup(&cli).await?;
            cli::discover(&config, args).await?;
            true
        }
        Command::Call(args) => {
            let config = setup(&cli).await?;
            cli::call(&config, args).await?
        }
        Command::Route(args) => {
            let config = setup(&cli).await?;
            cli::route(&config, args).await?;
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
