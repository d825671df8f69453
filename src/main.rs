//! Entry point for the telemetry publisher binary.
//!
//! Wires together the config store, logger, and pipeline: load config,
//! initialize logging, install the shutdown signal handler, run the
//! pipeline until asked to stop.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use log::{error, warn};

use tinysk_publisher::config::Config;
use tinysk_publisher::{logging, pipeline};

#[derive(Parser, Debug)]
#[command(name = "tinysk_publisher", about = "Multi-sensor telemetry publisher")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(short, long, value_name = "PATH")]
    config: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("critical: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.log);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            warn!("shutdown signal received");
            stop.store(true, Ordering::SeqCst);
        }) {
            error!("critical: failed to install signal handler: {e}");
            return ExitCode::FAILURE;
        }
    }

    match pipeline::run(config, stop) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("critical: {e}");
            ExitCode::FAILURE
        }
    }
}
