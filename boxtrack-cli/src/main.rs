//! boxtrack - delivery progress from shipment scans
//!
//! Reads a dataset file, runs one command and prints its result as JSON on
//! stdout. Logs go to stderr (or the configured log file).

use anyhow::{Context, Result};
use boxtrack_cli::{load_config, run, Cli};
use boxtrack_common::config::LoggingConfig;
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref(), std::io::stderr)?;

    init_tracing(&config.logging)?;

    // Log build identification immediately after tracing init
    info!(
        "Starting boxtrack v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let output = match run(&cli, &config).await {
        Ok(output) => output,
        Err(e) => {
            error!("{:#}", e);
            return Err(e);
        }
    };

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    }
    .context("Failed to render output")?;
    println!("{}", rendered);

    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("Invalid log level: {}", logging.level))?;

    let writer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(logging.file.is_none())
        .init();
    Ok(())
}
