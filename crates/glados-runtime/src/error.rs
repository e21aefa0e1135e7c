//! Runtime error types.

use std::path::PathBuf;

use thiserror::Error;

use glados_core::{PluginCategory, PluginError, ScheduleError, SessionError, TransportError};

use crate::config::ConfigError;

/// Errors that stop the gateway from starting or running.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The messaging service could not be reached.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The persistent session could not be loaded or committed.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The control socket could not be bound.
    #[error("Control socket error: {0}")]
    Control(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors reading the plugin manifest. Both degrade to an empty plugin set.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The manifest file does not exist.
    #[error("Plugin manifest not found: {0}")]
    NotFound(PathBuf),

    /// The manifest could not be read.
    #[error("Failed to read plugin manifest: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest is not a JSON object of plugin entries.
    #[error("Malformed plugin manifest: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Why a single manifest entry was not admitted.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No factory is registered under the class name.
    #[error("Unknown plugin class: {0}")]
    UnknownClass(String),

    /// The manifest names a category that does not exist.
    #[error("Unknown plugin category {category:?} for {class}")]
    UnknownCategory { class: String, category: String },

    /// The manifest category differs from the factory's.
    #[error("{class} is registered as {registered} but the manifest declares {declared}")]
    CategoryMismatch {
        class: String,
        registered: PluginCategory,
        declared: PluginCategory,
    },

    /// The plugin's help text is empty.
    #[error("{0} has no help text")]
    MissingHelp(String),

    /// A timed plugin's interval is not a valid cron expression.
    #[error("{class} has an invalid interval: {source}")]
    InvalidInterval {
        class: String,
        #[source]
        source: ScheduleError,
    },

    /// Another admitted plugin already uses the name.
    #[error("Duplicate plugin name: {0}")]
    DuplicateName(String),

    /// The factory failed or panicked.
    #[error("Failed to construct {class}: {source}")]
    Construction {
        class: String,
        #[source]
        source: PluginError,
    },
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
