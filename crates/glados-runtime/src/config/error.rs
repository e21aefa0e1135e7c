use std::path::PathBuf;

use thiserror::Error;

/// Why the gateway could not be configured.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    #[error("config could not be parsed: {0}")]
    ParseError(String),

    /// A setting that parsed but cannot be used.
    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// The API token file is absent or blank.
    #[error("no API token in {}", .0.display())]
    MissingToken(PathBuf),

    #[error("cannot read token file {}: {source}", path.display())]
    TokenUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
