//! covsynth CLI entry point.

use clap::Parser;

use covsynth::cli::{self, Cli, Commands};
use covsynth::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => cli::handle_error(err, cli.json),
    };
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }

    let _logger = match LoggerImpl::init(&LogConfig::from(&config.logging)) {
        Ok(logger) => logger,
        Err(err) => cli::handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Run(args) => cli::commands::run::execute(args, config, cli.json).await,
        Commands::Detect(args) => cli::commands::detect::execute(args, config, cli.json).await,
        Commands::Coverage(args) => cli::commands::coverage::execute(args, config, cli.json).await,
        Commands::Config(args) => cli::commands::config::execute(args, config, cli.json).await,
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => cli::handle_error(err, cli.json),
    }
}
