//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GladosConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Per-channel transcript settings.
    #[serde(default)]
    pub channel_log: ChannelLogConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lowercase name, as accepted by `EnvFilter` directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level.
    #[serde(default)]
    pub level: LogLevel,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `glados_transport = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            thread_ids: false,
            file_location: false,
            filters: HashMap::new(),
        }
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// File holding the API token.
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,

    /// Web API root.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Timeout for Web API calls, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Plugin manifest.
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// Restrict all traffic to the debug channel.
    #[serde(default)]
    pub debug: bool,

    /// Name of the debug channel.
    #[serde(default = "default_debug_channel")]
    pub debug_channel: String,

    /// Name that prefixes the help trigger (`<bot_name> help`).
    #[serde(default = "default_bot_name")]
    pub bot_name: String,

    /// Persistent session document.
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,

    /// Commit the session after every handled message.
    #[serde(default)]
    pub commit_after_handle: bool,

    /// Timer tick period, in seconds.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Control socket path; `None` disables the socket.
    #[serde(default = "default_control_socket")]
    pub control_socket: Option<PathBuf>,

    /// Upper bound on waiting for the drivers during shutdown, in seconds.
    #[serde(default)]
    pub shutdown_timeout_secs: Option<u64>,
}

impl GatewayConfig {
    /// Timer tick period.
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Web API call timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Shutdown join bound, if any.
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            token_file: default_token_file(),
            api_base: default_api_base(),
            http_timeout_secs: default_http_timeout_secs(),
            manifest: default_manifest(),
            debug: false,
            debug_channel: default_debug_channel(),
            bot_name: default_bot_name(),
            session_file: default_session_file(),
            commit_after_handle: false,
            tick_secs: default_tick_secs(),
            control_socket: default_control_socket(),
            shutdown_timeout_secs: None,
        }
    }
}

fn default_token_file() -> PathBuf {
    PathBuf::from(".slack-token")
}

fn default_api_base() -> String {
    glados_transport::api::DEFAULT_API_BASE.to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_manifest() -> PathBuf {
    PathBuf::from("plugins.json")
}

fn default_debug_channel() -> String {
    "aperture-science".to_string()
}

fn default_bot_name() -> String {
    "glados".to_string()
}

fn default_session_file() -> PathBuf {
    PathBuf::from("memory.json")
}

fn default_tick_secs() -> u64 {
    60
}

fn default_control_socket() -> Option<PathBuf> {
    Some(PathBuf::from("./glados_sock"))
}

// =============================================================================
// Channel transcript
// =============================================================================

/// Per-channel transcript configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelLogConfig {
    /// Write transcripts at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Transcript root in production mode.
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,

    /// Transcript root in debug mode.
    #[serde(default = "default_debug_log_dir")]
    pub debug_dir: PathBuf,
}

impl ChannelLogConfig {
    /// Root directory for the given mode.
    pub fn root(&self, debug: bool) -> &PathBuf {
        if debug { &self.debug_dir } else { &self.dir }
    }
}

impl Default for ChannelLogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            dir: default_log_dir(),
            debug_dir: default_debug_log_dir(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/glados")
}

fn default_debug_log_dir() -> PathBuf {
    PathBuf::from("/tmp/glados")
}
