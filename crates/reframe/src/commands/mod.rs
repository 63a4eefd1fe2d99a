//! CLI command handlers.

pub mod config;
pub mod start;
pub mod worker;

use std::path::Path;

use anyhow::Result;
use reframe_config::{ConfigSource, LoadedConfig};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Load configuration, either from one explicit file or by discovery.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let loaded = match explicit {
        Some(path) => {
            let mut config = reframe_config::load_config_file(path)?;
            let warnings = reframe_config::env::apply_overrides(&mut config);
            LoadedConfig {
                config,
                sources: vec![ConfigSource {
                    path: path.to_path_buf(),
                    loaded: true,
                }],
                warnings,
            }
        }
        None => reframe_config::load_config(None)?,
    };

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    Ok(loaded)
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
