//! ---
//! hsim_section: "13-fleet-tooling"
//! hsim_subsection: "binary"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Binary entrypoint for the fleet launcher."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
//! Starts N independent `hsimd` processes on consecutive ports and
//! supervises them until interrupted. Instances share no state; each child
//! receives its port as a startup argument.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::process::{Child, Command};
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::filter::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "HydroBench fleet launcher",
    long_about = None
)]
struct Cli {
    #[arg(long, default_value_t = 5, help = "Number of device instances to launch")]
    instances: u16,

    #[arg(
        long,
        default_value_t = 5000,
        help = "First TCP port; instance i listens on base-port + i"
    )]
    base_port: u16,

    #[arg(
        long,
        value_name = "PATH",
        help = "Path to the hsimd executable (defaults to a sibling of this binary)"
    )]
    hsimd: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Settings file forwarded to every instance")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let binary = match &cli.hsimd {
        Some(path) => path.clone(),
        None => sibling_hsimd_path()?,
    };
    let ports = instance_ports(cli.base_port, cli.instances)?;

    let mut fleet = JoinSet::new();
    for port in ports {
        let mut command = Command::new(&binary);
        command.arg(port.to_string());
        if let Some(config) = &cli.config {
            command.arg("--config").arg(config);
        }
        command.kill_on_drop(true);
        let child = command
            .spawn()
            .with_context(|| format!("failed to start {} on port {}", binary.display(), port))?;
        info!(port, pid = child.id(), "started device instance");
        fleet.spawn(wait_for_exit(port, child));
    }

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("ctrl-c received; terminating fleet");
                // Aborting the wait tasks drops the child handles, and
                // kill_on_drop takes the processes down with them.
                fleet.shutdown().await;
                break;
            }
            exited = fleet.join_next() => {
                if exited.is_none() {
                    info!("all device instances exited");
                    break;
                }
            }
        }
    }
    info!("fleet stopped");
    Ok(())
}

/// Compute the consecutive port range for the fleet.
fn instance_ports(base_port: u16, instances: u16) -> Result<Vec<u16>> {
    (0..instances)
        .map(|index| {
            base_port
                .checked_add(index)
                .context("port range overflows u16")
        })
        .collect()
}

fn sibling_hsimd_path() -> Result<PathBuf> {
    let current = std::env::current_exe().context("unable to locate the running executable")?;
    let dir = current
        .parent()
        .context("executable path has no parent directory")?;
    Ok(dir.join("hsimd"))
}

/// Await one child. Every instance is waited on concurrently, so an
/// instance exiting on its own is logged immediately while the rest of the
/// fleet keeps running.
async fn wait_for_exit(port: u16, mut child: Child) {
    match child.wait().await {
        Ok(status) => info!(port, %status, "device instance exited"),
        Err(err) => warn!(port, error = %err, "failed to wait on instance"),
    }
}
