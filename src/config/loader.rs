use super::{get_global_config_dir, DashboardConfig, CONFIG_FILE_NAME};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Finds and reads the configuration file, then applies environment
/// overrides. The first existing file in the search path wins.
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        let mut search_paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Ok(dir) = get_global_config_dir() {
            search_paths.push(dir.join(CONFIG_FILE_NAME));
        }
        Self { search_paths }
    }

    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Load `explicit` if given (it must exist), otherwise the first file
    /// found on the search path, otherwise defaults.
    pub async fn load(&self, explicit: Option<&Path>) -> Result<DashboardConfig> {
        let mut config = match explicit {
            Some(path) => {
                if !path.exists() {
                    bail!("Configuration file not found: {}", path.display());
                }
                Self::read(path).await?
            }
            None => match self.search_paths.iter().find(|p| p.is_file()) {
                Some(path) => Self::read(path).await?,
                None => {
                    tracing::debug!("No configuration file found, using defaults");
                    DashboardConfig::default()
                }
            },
        };

        config.merge_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    async fn read(path: &Path) -> Result<DashboardConfig> {
        tracing::debug!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        DashboardConfig::from_toml(&content).with_context(|| format!("In {}", path.display()))
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
