//! GLaDOS Runtime - orchestration layer of the GLaDOS chat gateway.
//!
//! This crate provides:
//! - Configuration loading (`ConfigLoader`, `GladosConfig`)
//! - Logging setup (`LoggingBuilder`)
//! - The plugin manifest and static plugin registry (`Manifest`,
//!   `PluginRegistry`, `PluginManager`)
//! - The Timer Driver and the Event Router
//! - Process orchestration and shutdown (`GladosRuntime`, `Gateway`)
//!
//! # Registering plugins
//!
//! Plugin classes are registered by name; the manifest then selects which
//! of them run, in which order and under which category:
//!
//! ```ignore
//! use glados_runtime::GladosRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut runtime = GladosRuntime::new();
//!     runtime
//!         .registry_mut()
//!         .register_immediate("Echo", |ctx| Ok(Box::new(Echo::new(ctx))));
//!
//!     // Run until the connection closes or Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod timer;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, GatewayConfig, GladosConfig};
pub use error::{ManifestError, RegistryError, RegistryResult, RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use manifest::{Manifest, ManifestEntry};
pub use registry::{ActivePlugin, PluginFactory, PluginLoadState, PluginManager, PluginRegistry};
pub use router::{EventRouter, RouterSettings, RouterState, ShutdownReason};
pub use runtime::{Driver, Gateway, GladosRuntime, wait_for_shutdown};
pub use timer::TimerDriver;

// Re-export tracing for use by other crates
pub use tracing;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
