//! CLI for the telemetry transmitter
//!
//! Subcommands:
//! - `stream`: forward JSON readings from stdin or a file to the broker
//! - `check-config`: load, validate and print the effective settings

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use telemetry_transmitter::config::{Settings, load_config, load_config_from};
use telemetry_transmitter::connection::ConnectionState;
use telemetry_transmitter::ingest::forward_lines;
use telemetry_transmitter::utils::logging;
use telemetry_transmitter::Transmitter;
use tokio::io::BufReader;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "telemetry-transmitter")]
struct Cli {
    /// Configuration file (extension optional); defaults to `config/default`
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Forward readings, one JSON object (or array of objects) per line
    Stream {
        /// Read from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
        /// Seconds between reconnect attempts while disconnected
        #[arg(long, default_value_t = 5)]
        reconnect_secs: u64,
        /// Seconds between status log lines
        #[arg(long, default_value_t = 30)]
        status_secs: u64,
    },
    /// Load and validate the configuration, then print it as JSON
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(file) => load_config_from(file),
        None => load_config(),
    };
    let settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    let result = match cli.command {
        Command::Stream {
            input,
            reconnect_secs,
            status_secs,
        } => {
            run_stream(
                settings,
                input,
                Duration::from_secs(reconnect_secs.max(1)),
                Duration::from_secs(status_secs.max(1)),
            )
            .await
        }
        Command::CheckConfig => check_config(&settings),
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

fn check_config(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    let errors = settings.validate();
    if errors.is_empty() {
        info!("Configuration is valid");
        Ok(())
    } else {
        Err(format!("Invalid configuration: {}", errors.join("; ")).into())
    }
}

async fn run_stream(
    settings: Settings,
    input: Option<PathBuf>,
    reconnect_every: Duration,
    status_every: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let errors = settings.validate();
    if !errors.is_empty() {
        return Err(format!("Invalid configuration: {}", errors.join("; ")).into());
    }

    let transmitter = Arc::new(Transmitter::new(settings));
    if transmitter.connect().await {
        info!("Transmitter connected");
    } else {
        warn!(
            "Broker connection failed - data will be queued ({})",
            transmitter.last_error().unwrap_or_else(|| "timed out".into())
        );
    }

    // Reconnecting is the caller's job, not the transmitter's.
    let supervisor = {
        let transmitter = transmitter.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(reconnect_every).await;
                if transmitter.state() == ConnectionState::Disconnected {
                    info!("Reconnecting to broker");
                    transmitter.connect().await;
                }
            }
        })
    };

    let reporter = {
        let transmitter = transmitter.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(status_every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match serde_json::to_string(&transmitter.status()) {
                    Ok(status) => info!("Status: {status}"),
                    Err(e) => warn!("Failed to serialize status: {e}"),
                }
            }
        })
    };

    let outcome = tokio::select! {
        result = forward_input(&transmitter, input) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            Ok(())
        }
    };

    supervisor.abort();
    reporter.abort();
    transmitter.disconnect().await;

    let status = transmitter.status();
    if status.queue_size > 0 {
        warn!(
            "{} readings still buffered at shutdown and will be lost",
            status.queue_size
        );
    }
    info!("Final status: {}", serde_json::to_string(&status)?);

    outcome
}

async fn forward_input(
    transmitter: &Transmitter,
    input: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match input {
        Some(path) => {
            let file = tokio::fs::File::open(&path).await?;
            forward_lines(transmitter, BufReader::new(file)).await?;
        }
        None => {
            forward_lines(transmitter, BufReader::new(tokio::io::stdin())).await?;
        }
    }
    Ok(())
}
