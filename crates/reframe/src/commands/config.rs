//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Args, Subcommand};

use reframe_config::{self, ReframeConfig};

use super::{Context, load_config};

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration (files, environment and defaults)
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Show configuration file path
    Path,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./reframe.toml) instead of user config
        #[arg(long)]
        local: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(),
        ConfigCommand::Path => cmd_path(),
        ConfigCommand::Init { local, force } => cmd_init(local, force),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = load_config(None)?;

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("# No config files loaded (using defaults)");
    } else {
        for source in sources {
            println!("# Loaded: {}", source.display());
        }
    }
    if ctx.verbose {
        for warning in &loaded.warnings {
            println!("# Warning: {}", warning);
        }
    }
    println!();

    print!("{}", effective(&loaded.config).to_toml()?);
    Ok(())
}

/// Every section filled in, so `show` prints the values actually used.
fn effective(config: &ReframeConfig) -> ReframeConfig {
    let mut workers = config.workers_config();
    workers.count = Some(workers.resolved_count());
    workers.codec_threads = Some(workers.resolved_codec_threads());

    ReframeConfig {
        server: Some(config.server_config()),
        session: Some(config.session_config()),
        workers: Some(workers),
        limits: Some(config.limits_config()),
    }
}

fn cmd_which() -> Result<()> {
    let loaded = load_config(None)?;

    println!("Config file search order (later overrides earlier):\n");

    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'reframe config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }
    println!("REFRAME_* environment variables override files.");

    Ok(())
}

fn cmd_path() -> Result<()> {
    let path = reframe_config::xdg_config_path()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?;
    println!("{}", path.display());
    Ok(())
}

fn cmd_init(local: bool, force: bool) -> Result<()> {
    let path = if local {
        PathBuf::from(reframe_config::discovery::PROJECT_CONFIG_FILE)
    } else {
        reframe_config::xdg_config_path()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
    };

    if path.exists() && !force {
        println!("Config file already exists: {}", path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    reframe_config::save_config(&ReframeConfig::with_defaults(), &path)?;
    println!("Created config file: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_fills_every_section() {
        let config = ReframeConfig::from_toml("[workers]\ncount = 2\n").unwrap();
        let full = effective(&config);

        assert_eq!(full.workers.as_ref().and_then(|w| w.count), Some(2));
        assert!(full.workers.as_ref().and_then(|w| w.codec_threads).is_some());
        assert!(full.server.is_some());
        assert!(full.session.is_some());
        assert!(full.limits.is_some());
    }
}
