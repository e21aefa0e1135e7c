//! Configuration module for the GLaDOS runtime.
//!
//! TOML files layered with `GLADOS_*` environment variables, validated
//! before the gateway starts.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config, load_config_from_file};
pub use schema::{
    ChannelLogConfig, GatewayConfig, GladosConfig, LogFormat, LogLevel, LogOutput, LoggingConfig,
};
pub use validation::{read_token, validate_config};
