//! Unified error types for the GLaDOS core.
//!
//! Runtime-level errors (configuration, manifest, registry) live in
//! `glados-runtime`.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised by the messaging service transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed by the remote side.
    #[error("connection closed ({code}): {reason}")]
    ConnectionClosed {
        /// Close code reported by the socket.
        code: u16,
        /// Reason for closure.
        reason: String,
    },

    /// The HTTP request itself failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The Web API answered with `ok: false`.
    #[error("API call '{method}' failed: {error}")]
    Api {
        /// API method name.
        method: String,
        /// Error string returned by the service.
        error: String,
    },

    /// Message send failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// A frame or response did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

// =============================================================================
// Plugin Errors
// =============================================================================

/// Errors produced by plugin hooks.
///
/// The router logs these and treats the failing plugin as a no-op for the
/// event at hand; they never propagate further.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The handler could not complete.
    #[error("{0}")]
    Failed(String),

    /// The plugin violates its declared contract.
    #[error("invalid plugin contract: {0}")]
    InvalidContract(String),

    /// The hook panicked.
    #[error("plugin panicked: {0}")]
    Panicked(String),

    /// Sending a reply or reaction failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reading or writing the persistent session failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl PluginError {
    /// Creates a generic failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Builds a [`PluginError::Panicked`] from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::Panicked(msg)
    }
}

// =============================================================================
// Schedule Errors
// =============================================================================

/// Errors produced while parsing a cron interval.
#[derive(Debug, Clone, Error)]
pub enum ScheduleError {
    /// The expression does not have exactly five fields.
    #[error("cron expression '{expr}' has {found} fields, expected 5")]
    FieldCount {
        /// The offending expression.
        expr: String,
        /// Number of whitespace-separated fields found.
        found: usize,
    },

    /// The expression has five fields but does not parse.
    #[error("invalid cron expression '{expr}': {reason}")]
    Invalid {
        /// The offending expression.
        expr: String,
        /// Parser message.
        reason: String,
    },
}

// =============================================================================
// Session Errors
// =============================================================================

/// Errors from the persistent plugin session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Reading or writing the backing file failed.
    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file or a stored value is not valid JSON for the
    /// requested type.
    #[error("session serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for plugin hooks.
pub type PluginResult<T> = Result<T, PluginError>;

/// Result type for schedule parsing.
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payload_str() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        let err = PluginError::from_panic(payload);
        assert_eq!(err.to_string(), "plugin panicked: boom");
    }

    #[test]
    fn test_panic_payload_string() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("kaboom"));
        assert!(matches!(PluginError::from_panic(payload), PluginError::Panicked(m) if m == "kaboom"));
    }
}
