//! Configuration system for Reframe.
//!
//! Provides TOML-based configuration with:
//! - Sections for the HTTP front end, session store, worker pool and codec limits
//! - Config file layering (XDG user config + project-local overrides)
//! - `REFRAME_*` environment overrides on top of the files
//!
//! CLI flags are applied by the binary after loading.

pub mod discovery;
pub mod env;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
