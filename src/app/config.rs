//! Application configuration
//!
//! Settings derived from the command line rather than the config file.

/// Application configuration structure
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Verbosity level for logging
    pub verbose: u8,
    /// Explicit tracing filter, e.g. from `log_level` in the config file
    pub log_filter: Option<String>,
}

impl AppConfig {
    pub fn new(verbose: u8) -> Self {
        Self {
            verbose,
            log_filter: None,
        }
    }

    pub fn with_log_filter(mut self, filter: Option<String>) -> Self {
        self.log_filter = filter;
        self
    }

    /// Get the log level string based on verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            2 => "trace",
            _ => "trace,hyper=debug,tower=debug",
        }
    }

    /// Filter to install: `RUST_LOG` first, then the configured filter, then
    /// the verbosity default.
    pub fn filter_directive(&self) -> String {
        std::env::var("RUST_LOG")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.log_filter.clone())
            .unwrap_or_else(|| self.log_level().to_string())
    }
}
