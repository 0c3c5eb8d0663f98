use clap::Parser;
use k6_dashboard::app::handle_fatal_error;
use k6_dashboard::cli::{execute_command, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    if let Err(e) = execute_command(cli).await {
        handle_fatal_error(e, verbose);
    }
}
