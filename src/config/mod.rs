use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::execution::ExecutionSettings;

pub mod loader;

pub use loader::ConfigLoader;

/// File name looked up in the working directory and the config directory.
pub const CONFIG_FILE_NAME: &str = "k6-dashboard.toml";

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "K6DASH_";

/// Platform config directory, e.g. `~/.config/k6-dashboard` on Linux.
pub fn get_global_config_dir() -> Result<PathBuf> {
    ProjectDirs::from("io", "k6-dashboard", "k6-dashboard")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow!("Could not determine home directory"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Tracing filter; overrides the `-v` count when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// IANA zone used for run timestamps and artifact names.
    pub timezone: String,
    pub server: ServerConfig,
    pub k6: K6Config,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Events buffered per WebSocket subscriber before the slowest one lags.
    pub event_buffer: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct K6Config {
    pub binary: String,
    pub tests_dir: PathBuf,
    pub results_dir: PathBuf,
    pub batch_shell: String,
    pub batch_script: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Passed to tests when a request carries no token of its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    #[serde(with = "humantime_serde")]
    pub kill_grace_period: Duration,
    #[serde(with = "humantime_serde")]
    pub single_results_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub batch_results_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub stream_drain_timeout: Duration,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            timezone: "UTC".to_string(),
            server: ServerConfig::default(),
            k6: K6Config::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            event_buffer: 1024,
        }
    }
}

impl Default for K6Config {
    fn default() -> Self {
        let execution = ExecutionSettings::default();
        Self {
            binary: execution.k6_binary,
            tests_dir: execution.tests_dir,
            results_dir: execution.results_dir,
            batch_shell: execution.batch_shell,
            batch_script: execution.batch_script,
            working_dir: None,
            auth_token: None,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        let execution = ExecutionSettings::default();
        Self {
            kill_grace_period: execution.kill_grace_period,
            single_results_delay: execution.single_results_delay,
            batch_results_delay: execution.batch_results_delay,
            stream_drain_timeout: execution.stream_drain_timeout,
        }
    }
}

impl DashboardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid configuration file")
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `K6DASH_*` overrides read through `lookup`.
    pub fn merge_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(binary) = var("K6_BINARY") {
            self.k6.binary = binary;
        }
        if let Some(dir) = var("TESTS_DIR") {
            self.k6.tests_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("RESULTS_DIR") {
            self.k6.results_dir = PathBuf::from(dir);
        }
        if let Some(script) = var("BATCH_SCRIPT") {
            self.k6.batch_script = PathBuf::from(script);
        }
        if let Some(token) = var("AUTH_TOKEN") {
            self.k6.auth_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(timezone) = var("TIMEZONE") {
            self.timezone = timezone;
        }
        if let Some(host) = var("HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("{ENV_PREFIX}PORT is not a valid port: {port}"))?;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.log_level = Some(level);
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| anyhow!("Unknown timezone: {}", self.timezone))
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must not be 0");
        }
        if self.server.event_buffer == 0 {
            bail!("server.event_buffer must be at least 1");
        }
        if self.k6.binary.trim().is_empty() {
            bail!("k6.binary must not be empty");
        }
        if self.k6.batch_shell.trim().is_empty() {
            bail!("k6.batch_shell must not be empty");
        }
        self.timezone()?;
        Ok(())
    }

    pub fn execution_settings(&self) -> Result<ExecutionSettings> {
        Ok(ExecutionSettings {
            k6_binary: self.k6.binary.clone(),
            batch_shell: self.k6.batch_shell.clone(),
            batch_script: self.k6.batch_script.clone(),
            tests_dir: self.k6.tests_dir.clone(),
            results_dir: self.k6.results_dir.clone(),
            working_dir: self.k6.working_dir.clone(),
            default_auth_token: self.k6.auth_token.clone(),
            timezone: self.timezone()?,
            kill_grace_period: self.timing.kill_grace_period,
            single_results_delay: self.timing.single_results_delay,
            batch_results_delay: self.timing.batch_results_delay,
            stream_drain_timeout: self.timing.stream_drain_timeout,
        })
    }

    /// Directory the tests and results paths are relative to.
    pub fn base_dir(&self) -> PathBuf {
        self.k6
            .working_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_execution_settings() {
        let config = DashboardConfig::default();
        let settings = config.execution_settings().unwrap();

        assert_eq!(settings.k6_binary, "k6");
        assert_eq!(settings.timezone, Tz::UTC);
        assert_eq!(settings.kill_grace_period, Duration::from_secs(5));
        assert_eq!(settings.single_results_delay, Duration::from_secs(2));
        assert_eq!(settings.batch_results_delay, Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = DashboardConfig::from_toml(
            r#"
timezone = "Europe/Amsterdam"

[server]
port = 8080

[k6]
binary = "/usr/local/bin/k6"
auth_token = "secret"

[timing]
kill_grace_period = "10s"
single_results_delay = "500ms"
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.k6.binary, "/usr/local/bin/k6");
        assert_eq!(config.k6.tests_dir, PathBuf::from("tests"));
        assert_eq!(config.timing.kill_grace_period, Duration::from_secs(10));
        assert_eq!(config.timing.single_results_delay, Duration::from_millis(500));
        assert_eq!(config.timing.batch_results_delay, Duration::from_secs(3));

        let settings = config.execution_settings().unwrap();
        assert_eq!(settings.timezone, chrono_tz::Europe::Amsterdam);
        assert_eq!(settings.default_auth_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = DashboardConfig::default();
        config
            .merge_env_from(env(&[
                ("K6DASH_K6_BINARY", "/opt/k6"),
                ("K6DASH_PORT", "9000"),
                ("K6DASH_HOST", "0.0.0.0"),
                ("K6DASH_TIMEZONE", "Asia/Tokyo"),
                ("K6DASH_RESULTS_DIR", "/data/results"),
                ("K6DASH_LOG_LEVEL", "debug"),
                ("K6DASH_AUTH_TOKEN", "t0k"),
            ]))
            .unwrap();

        assert_eq!(config.k6.binary, "/opt/k6");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.timezone, "Asia/Tokyo");
        assert_eq!(config.k6.results_dir, PathBuf::from("/data/results"));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.k6.auth_token.as_deref(), Some("t0k"));
    }

    #[test]
    fn test_env_port_must_be_numeric() {
        let mut config = DashboardConfig::default();
        let err = config
            .merge_env_from(env(&[("K6DASH_PORT", "http")]))
            .unwrap_err();
        assert!(err.to_string().contains("K6DASH_PORT"));
    }

    #[test]
    fn test_empty_env_token_clears_default() {
        let mut config = DashboardConfig::default();
        config.k6.auth_token = Some("from-file".to_string());
        config
            .merge_env_from(env(&[("K6DASH_AUTH_TOKEN", "")]))
            .unwrap();
        assert!(config.k6.auth_token.is_none());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = DashboardConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = DashboardConfig::default();
        config.timezone = "Mars/Olympus_Mons".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("Unknown timezone"));

        let mut config = DashboardConfig::default();
        config.k6.binary = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_output_is_readable_back() {
        let mut config = DashboardConfig::default();
        config.k6.working_dir = Some(PathBuf::from("/srv/loadtests"));
        config.timing.stream_drain_timeout = Duration::from_millis(250);

        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("kill_grace_period = \"5s\""));
        assert_eq!(DashboardConfig::from_toml(&rendered).unwrap(), config);
    }
}
