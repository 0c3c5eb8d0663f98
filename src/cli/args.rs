//! CLI argument structures

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Run k6 load tests and stream their output to a web dashboard
#[derive(Parser)]
#[command(name = "k6-dashboard")]
#[command(about = "k6-dashboard - Run k6 load tests and watch them live", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the dashboard API and event stream
    Serve {
        /// Address to bind (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one test, or `all`, in the foreground
    Run(RunArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Test name (script in the tests directory, without `.js`) or `all`
    pub test: String,

    /// Load profile passed to the test as PROFILE
    #[arg(long, default_value = "LIGHT")]
    pub profile: String,

    /// Target environment passed to the test as ENVIRONMENT
    #[arg(short, long, default_value = "DEV")]
    pub environment: String,

    /// Auth token passed to the test; falls back to the configured one
    #[arg(long)]
    pub token: Option<String>,
}
