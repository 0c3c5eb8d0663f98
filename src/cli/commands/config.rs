use anyhow::Result;

use crate::config::DashboardConfig;

/// Print the configuration after file and environment overrides.
pub fn run_config_command(config: &DashboardConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
