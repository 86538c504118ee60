//! ---
//! hsim_section: "01-core-functionality"
//! hsim_subsection: "binary"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Binary entrypoint for the device daemon."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use hsim_api::{ApiBuilder, SharedDevice};
use hsim_common::config::SimSettings;
use hsim_common::logging::init_tracing;
use hsim_common::metrics::{new_registry, DeviceMetrics};
use hsim_device::{DeviceConfig, SimulatedDevice};
use parking_lot::Mutex;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "HydroBench simulated device daemon",
    long_about = None
)]
struct Cli {
    /// TCP port the HTTP API listens on. The fleet launcher assigns
    /// consecutive ports through this argument.
    port: u16,

    #[arg(long, value_name = "FILE", help = "Path to settings file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Override the device name")]
    name: Option<String>,

    #[arg(long, help = "Fixed seed for the sensor noise generator")]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/hsim.toml"));
    let settings = SimSettings::load(&candidates)?;
    init_tracing("hsimd", Some(&cli.port.to_string()), &settings.logging)?;

    let device = build_device(&cli, &settings)?;
    let device_name = device.lock().config().name.clone();

    let registry = new_registry();
    let metrics = Arc::new(DeviceMetrics::new(&registry)?);

    let listen = SocketAddr::new(settings.api.listen, cli.port);
    let api = ApiBuilder::new(listen, device.clone())
        .with_metrics(registry, metrics.clone())
        .spawn()
        .await?;
    info!(address = %api.local_addr(), device = %device_name, "device instance ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_task = tokio::spawn(run_polling_loop(device, metrics, shutdown_rx));

    shutdown_signal().await;
    info!("termination signal received; shutting down");
    let _ = shutdown_tx.send(true);
    poll_task.await?;
    api.shutdown().await?;
    Ok(())
}

fn build_device(cli: &Cli, settings: &SimSettings) -> Result<SharedDevice> {
    let now = Utc::now();
    let seed = cli.seed.or(settings.simulation.random_seed);
    let mut device = match seed {
        Some(seed) => SimulatedDevice::with_seed(seed, now),
        None => SimulatedDevice::new(now),
    };

    let name = cli
        .name
        .clone()
        .or_else(|| settings.device.name.clone())
        .unwrap_or_else(|| device.config().name.clone());
    device.apply_config(DeviceConfig {
        watering_interval: settings.device.watering_interval,
        watering_duration: settings.device.watering_duration,
        name,
    })?;

    Ok(Arc::new(Mutex::new(device)))
}

/// Single periodic task driving the simulation.
///
/// The device mutex is held for exactly one poll step, then the task sleeps
/// for the delay the engine returned (100 ms while watering, 60 s idle),
/// recomputed every iteration.
async fn run_polling_loop(
    device: SharedDevice,
    metrics: Arc<DeviceMetrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let delay = {
            let mut device = device.lock();
            let was_watering = device.is_watering();
            let delay = device.poll(Utc::now());

            metrics.polls_total.inc();
            if device.is_watering() != was_watering {
                metrics.watering_transitions_total.inc();
            }
            let status = device.snapshot();
            metrics.temperature_c.set(status.temperature_c);
            metrics.water_level.set(status.water_level);
            metrics.history_entries.set(device.history_len() as i64);
            metrics.buffered_samples.set(device.buffered_samples() as i64);
            metrics
                .last_reading_timestamp_seconds
                .set(device.last_reading().timestamp());
            delay
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    info!("polling loop stopped");
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => warn!(?err, "failed to install SIGTERM handler"),
    }
}
