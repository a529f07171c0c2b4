//! # Groundlink
//!
//! Records telemetry from serial-connected devices and keeps a live ground
//! track per device for antenna pointing.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Parse the command line and load the configuration
//!    - Set up logging to stderr and to a daily log file
//!
//! 2. **Main Loop**
//!    - Connect every configured port and start its worker threads
//!    - Dispatch records and write the status snapshot on intervals
//!    - Handle Ctrl+C for graceful shutdown
//!
//! 3. **Graceful Shutdown**
//!    - Stop ingest, flush the remaining records to disk
//!    - Close the ports
//!
//! # Examples
//!
//! ```bash
//! groundlink --list-ports
//! groundlink --config config/groundlink.toml
//! ```
//!
//! Expected output:
//! ```text
//! INFO groundlink: Groundlink v0.1.0 starting...
//! INFO groundlink::serial: Device "/dev/ttyUSB0" connected at 115200 baud
//! INFO groundlink::pipeline::lifecycle: ingest-0 started
//! INFO groundlink::pipeline::lifecycle: persist-0 started
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use groundlink::app::{self, Fleet};
use groundlink::config::Config;
use groundlink::serial::port_trait::SystemSerial;
use groundlink::serial::watchdog::ReconnectPolicy;
use groundlink::serial::PortConnection;
use groundlink::storage::ColorAllocator;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "groundlink", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config/groundlink.toml")]
    config: PathBuf,

    /// Print the available serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

/// Log to stderr and to a daily file in `log_dir`
///
/// The returned guard must be held until exit so buffered lines are flushed.
fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", log_dir))?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "groundlink.log"));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_found = args.config.exists();
    let config = if config_found {
        Config::load(&args.config)
            .with_context(|| format!("Failed to load configuration from {:?}", args.config))?
    } else {
        Config::default()
    };

    let _log_guard = init_logging(&config.telemetry.log_dir)?;
    info!("Groundlink v{} starting...", env!("CARGO_PKG_VERSION"));
    if !config_found {
        warn!("No configuration at {:?}, using defaults", args.config);
    }

    if args.list_ports {
        let port = PortConnection::system(ReconnectPolicy::default());
        let candidates = port.list_candidates().context("Failed to enumerate serial ports")?;
        if candidates.is_empty() {
            println!("No serial devices found");
        }
        for (name, path) in candidates {
            println!("{}\t{}", path, name);
        }
        return Ok(());
    }

    let colors = ColorAllocator::new();
    let mut fleet = Fleet::build(&config, Arc::new(SystemSerial), &colors)?;
    if let Err(e) = fleet.start() {
        fleet.shutdown()?;
        return Err(e.into());
    }

    info!("Press Ctrl+C to exit");
    app::run(&mut fleet, &config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C");
    })
    .await?;

    Ok(())
}
