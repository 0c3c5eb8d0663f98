//! Command implementation modules

pub mod config;
pub mod run;
pub mod serve;

pub use config::run_config_command;
pub use run::run_test_command;
pub use serve::run_serve_command;
