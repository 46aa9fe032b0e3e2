//! Patch Miner - extract tissue patches from Whole Slide Images.
//!
//! This binary parses the command line, sets up logging and runs the driver.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use patch_miner::{config::Cli, driver, slide::AutoSlideSource};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let request = match cli.into_request() {
        Ok(request) => request,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Slide: {}", request.input_path.display());
    info!("Config: {}", request.config_path.display());
    if let Some(ref csv) = request.input_csv {
        info!("Mode: replay of {}", csv.display());
    } else {
        info!("Mode: mask-driven mining");
    }
    if let Some(ref output) = request.output_path {
        info!("Output directory: {}", output.display());
    }
    info!("Workers: {}", request.threads);

    match driver::run(&request, &AutoSlideSource::new()).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "patch_miner=debug"
    } else {
        "patch_miner=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
