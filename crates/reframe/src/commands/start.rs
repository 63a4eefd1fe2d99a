//! Start command - run the service.
//!
//! With `workers.count = 0` a single in-process server answers clients.
//! Otherwise worker processes are spawned on consecutive local ports and a
//! front router on the public address forwards to them.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::info;

use reframe_config::ReframeConfig;
use reframe_server::{
    FrontRouter, RouterConfig, Server, ServerConfig, Supervisor, WorkerCommand, WorkerSpec,
};

use super::{Context, load_config, shutdown_signal, worker::WORKER_CONFIG_ENV};

/// Arguments for the start command.
#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Number of worker processes; 0 serves everything in-process
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// First worker port (overrides config)
    #[arg(long)]
    pub base_port: Option<u16>,

    /// Concurrent codec jobs per process (overrides config)
    #[arg(long)]
    pub codec_threads: Option<usize>,

    /// Maximum sessions per worker (overrides config)
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Maximum bytes of stored images per worker (overrides config)
    #[arg(long)]
    pub max_session_bytes: Option<usize>,

    /// Idle seconds before a session expires; 0 disables expiry
    #[arg(long)]
    pub session_ttl: Option<u64>,

    /// Per-request processing deadline in seconds (overrides config)
    #[arg(long)]
    pub request_timeout: Option<u64>,

    /// Maximum upload size in bytes (overrides config)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Largest width or height a transform may produce (overrides config)
    #[arg(long)]
    pub max_dimension: Option<u32>,

    /// Load this config file instead of discovering one
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl StartArgs {
    /// Apply command-line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut ReframeConfig) {
        if let Some(port) = self.port {
            config.server_mut().port = port;
        }
        if let Some(bind) = &self.bind {
            config.server_mut().bind = bind.clone();
        }
        if let Some(max) = self.max_upload_bytes {
            config.server_mut().max_upload_bytes = max;
        }
        if let Some(secs) = self.request_timeout {
            config.server_mut().request_timeout_secs = secs;
        }
        if let Some(count) = self.workers {
            config.workers_mut().count = Some(count);
        }
        if let Some(port) = self.base_port {
            config.workers_mut().base_port = port;
        }
        if let Some(threads) = self.codec_threads {
            config.workers_mut().codec_threads = Some(threads);
        }
        if let Some(max) = self.max_sessions {
            config.session_mut().max_sessions = max;
        }
        if let Some(max) = self.max_session_bytes {
            config.session_mut().max_bytes = max;
        }
        if let Some(secs) = self.session_ttl {
            config.session_mut().ttl_secs = secs;
        }
        if let Some(max) = self.max_dimension {
            config.limits_mut().max_dimension = max;
        }
    }
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    let loaded = load_config(args.config.as_deref())?;

    if ctx.verbose {
        let sources = loaded.loaded_from();
        if sources.is_empty() {
            println!("No config files found, using defaults + CLI args");
        } else {
            for source in sources {
                println!("Loaded config: {}", source.display());
            }
        }
    }

    let mut config = loaded.config;
    args.apply(&mut config);
    config.validate()?;

    let server_config = ServerConfig::from_config(&config)?;
    let workers = config.workers_config();
    let count = workers.resolved_count();

    if count == 0 {
        return run_in_process(server_config).await;
    }

    // Workers get the effective config verbatim, CLI overrides included.
    let mut command = WorkerCommand::current_exe()
        .context("Could not locate the reframe executable")?
        .env(WORKER_CONFIG_ENV, config.to_toml()?);
    if ctx.verbose {
        command = command.arg("--verbose");
    }

    let specs = WorkerSpec::sequence(count, workers.base_port);
    let worker_addrs: Vec<SocketAddr> = specs
        .iter()
        .map(|spec| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), spec.port))
        .collect();

    let supervisor = Supervisor::new(command, specs)
        .with_restart_delay(workers.restart_delay())
        .start();

    let router_config = RouterConfig::new(server_config.bind_address, worker_addrs)
        .with_request_logging(server_config.request_logging)
        .with_max_upload_bytes(server_config.max_upload_bytes)
        .with_upstream_timeout(server_config.request_timeout + Duration::from_secs(5));
    let router = FrontRouter::new(router_config)?;
    let addr = router.bind_address();

    info!(workers = count, base_port = workers.base_port, "Starting worker pool");
    println!("Reframe starting on http://{} with {} workers", addr, count);
    println!("Press Ctrl+C to stop");

    let served = router.run_until(addr, shutdown_signal()).await;

    info!("Stopping workers");
    supervisor.shutdown().await;

    served?;
    Ok(())
}

async fn run_in_process(config: ServerConfig) -> Result<()> {
    let addr = config.bind_address;
    let server = Server::new(config);

    println!("Reframe starting on http://{} (in-process)", addr);
    println!("Press Ctrl+C to stop");

    server.run_until(addr, shutdown_signal()).await?;
    Ok(())
}
