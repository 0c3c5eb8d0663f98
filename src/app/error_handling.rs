//! Error handling utilities

use tracing::error;

/// Exit status for failures in the program itself.
pub const GENERAL_ERROR: i32 = 1;
/// Exit status for unusable arguments or configuration.
pub const ARGUMENT_ERROR: i32 = 2;

/// Marks an error as caused by configuration rather than at runtime.
#[derive(Debug, thiserror::Error)]
#[error("Configuration error: {0}")]
pub struct ConfigError(pub String);

/// Handle fatal errors and exit with appropriate status code
///
/// - `verbose = 0`: the top-level message only
/// - `verbose >= 1`: the full error chain
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {:#}", error);
    eprintln!("Error: {error}");

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code(&error))
}

pub fn exit_code(error: &anyhow::Error) -> i32 {
    let is_config = error
        .chain()
        .any(|cause| cause.downcast_ref::<ConfigError>().is_some());
    if is_config {
        ARGUMENT_ERROR
    } else {
        GENERAL_ERROR
    }
}
