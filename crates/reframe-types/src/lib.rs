//! Shared types for the Reframe image service.

pub mod config;

pub use config::{
    CodecConfigProvider, ConfigProvider, HasCodecConfig, HasSessionConfig, SessionConfigProvider,
    defaults as config_defaults,
};
