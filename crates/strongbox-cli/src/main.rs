//! Strongbox CLI entry point.

use clap::Parser;
use strongbox_cli::{logging, render, run, Cli};
use strongbox_core::{env, Config};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = env::load_dotenv() {
        eprintln!("Warning: failed to read .env: {e}");
    }

    // Parse CLI arguments
    let cli = Cli::parse();

    let config = match Config::resolve(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            render::render_failure(&anyhow::Error::new(e));
            std::process::exit(2);
        }
    };

    // Initialize logging
    let log_path = logging::init(config.log_level);
    info!(log = ?log_path, "Starting strongbox {}", env!("CARGO_PKG_VERSION"));

    // Run the command
    if let Err(e) = run(cli, config).await {
        error!("Command failed: {:#}", e);
        render::render_failure(&e);
        // Exits without waiting for a stdin reader that may still be blocked.
        std::process::exit(1);
    }
}
