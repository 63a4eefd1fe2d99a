//! Worker command - one transform worker behind the front router.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{Result, bail};
use clap::Args;
use tracing::info;

use reframe_config::ReframeConfig;
use reframe_server::{Server, ServerConfig};
use reframe_types::config_defaults;

use super::{Context, load_config, shutdown_signal};

/// Environment variable through which `start` hands its effective config,
/// as TOML, to each worker.
pub const WORKER_CONFIG_ENV: &str = "REFRAME_WORKER_CONFIG";

/// Arguments for the worker command.
#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Worker index, embedded in every session ID this worker creates
    #[arg(long)]
    pub index: u16,

    /// Local port to listen on
    #[arg(long)]
    pub port: u16,
}

/// Run the worker command.
pub async fn run(args: WorkerArgs, _ctx: &Context) -> Result<()> {
    let config = worker_config()?;
    config.validate()?;

    if usize::from(args.index) >= config_defaults::MAX_WORKERS {
        bail!("worker index {} is out of range", args.index);
    }

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), args.port);
    let server_config = ServerConfig::from_config(&config)?
        .with_worker_index(args.index)
        .with_bind_address(addr);

    info!(
        worker = args.index,
        port = args.port,
        pid = std::process::id(),
        "Worker starting"
    );

    Server::new(server_config)
        .run_until(addr, shutdown_signal())
        .await?;

    info!(worker = args.index, "Worker stopped");
    Ok(())
}

fn worker_config() -> Result<ReframeConfig> {
    match std::env::var(WORKER_CONFIG_ENV) {
        Ok(toml) if !toml.is_empty() => Ok(ReframeConfig::from_toml(&toml)?),
        _ => Ok(load_config(None)?.config),
    }
}
