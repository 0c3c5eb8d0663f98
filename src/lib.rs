//! # k6-dashboard
//!
//! Runs k6 load tests as child processes and streams their output to a web
//! dashboard.
//!
//! ## Usage
//!
//! ```bash
//! k6-dashboard serve [--host 0.0.0.0] [--port 3001]
//! k6-dashboard run account --profile LIGHT --environment PROD
//! ```
//!
//! ## Modules
//!
//! - `app` - Logging setup and fatal error handling
//! - `cli` - Command-line parsing and command implementations
//! - `config` - TOML configuration with environment overrides
//! - `execution` - Run orchestration: spawning, output classification, stop escalation
//! - `server` - REST endpoints and the WebSocket event stream
//! - `subprocess` - Process spawning and process-group signalling
//! - `testing` - Recording doubles and fixtures for tests
pub mod app;
pub mod cli;
pub mod config;
pub mod execution;
pub mod server;
pub mod subprocess;

pub mod testing;
