//! Command routing and execution

use anyhow::Result;

use crate::app::{init_logging, AppConfig, ConfigError};
use crate::cli::args::{Cli, Commands};
use crate::cli::commands::{run_config_command, run_serve_command, run_test_command};
use crate::config::ConfigLoader;

/// Load configuration, set up logging and run the selected command.
pub async fn execute_command(cli: Cli) -> Result<()> {
    let config = ConfigLoader::new()
        .load(cli.config.as_deref())
        .await
        .map_err(|e| ConfigError(format!("{e:#}")))?;

    init_logging(&AppConfig::new(cli.verbose).with_log_filter(config.log_level.clone()));

    match cli.command {
        Commands::Serve { host, port } => run_serve_command(config, host, port).await,
        Commands::Run(args) => run_test_command(&config, args).await,
        Commands::Config => run_config_command(&config),
    }
}
