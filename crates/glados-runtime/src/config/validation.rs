//! Checks run before the gateway connects.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::error::{ConfigError, ConfigResult};
use super::schema::GladosConfig;

/// Rejects settings the gateway cannot start with.
pub fn validate_config(config: &GladosConfig) -> ConfigResult<()> {
    let gateway = &config.gateway;

    let bot_name = gateway.bot_name.trim();
    if bot_name.is_empty() {
        return Err(ConfigError::invalid("gateway.bot_name", "must not be empty"));
    }
    // The help trigger is "<bot_name> help"; a name with spaces never matches.
    if bot_name.contains(char::is_whitespace) {
        return Err(ConfigError::invalid("gateway.bot_name", "must be a single word"));
    }
    if gateway.tick_secs == 0 {
        return Err(ConfigError::invalid("gateway.tick_secs", "must be at least 1"));
    }
    if gateway.http_timeout_secs == 0 {
        return Err(ConfigError::invalid("gateway.http_timeout_secs", "must be at least 1"));
    }
    if gateway.debug && gateway.debug_channel.trim().is_empty() {
        return Err(ConfigError::invalid(
            "gateway.debug_channel",
            "debug mode needs a channel to listen on",
        ));
    }
    if !(gateway.api_base.starts_with("https://") || gateway.api_base.starts_with("http://")) {
        return Err(ConfigError::invalid(
            "gateway.api_base",
            format!("{:?} is not an http(s) URL", gateway.api_base),
        ));
    }
    Ok(())
}

/// Reads the API token, trimming surrounding whitespace.
pub fn read_token(path: &Path) -> ConfigResult<String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::MissingToken(path.to_path_buf()));
        }
        Err(source) => {
            return Err(ConfigError::TokenUnreadable {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    match raw.trim() {
        "" => Err(ConfigError::MissingToken(path.to_path_buf())),
        token => Ok(token.to_string()),
    }
}
