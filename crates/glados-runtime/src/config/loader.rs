//! Layered configuration with figment.
//!
//! Sources, lowest priority first:
//!
//! 1. [`GladosConfig::default`]
//! 2. `glados.<profile>.toml` (only when a profile is selected)
//! 3. `glados.toml`, or `config.toml`, from the first search directory
//!    that has one
//! 4. `GLADOS_*` environment variables, `__` separating sections
//!    (`GLADOS_GATEWAY__DEBUG=true`, `GLADOS_CHANNEL_LOG__DIR=/srv/logs`)
//! 5. values passed to [`ConfigLoader::merge`]
//!
//! The profile comes from `GLADOS_PROFILE` unless [`ConfigLoader::profile`]
//! sets one. Without explicit search paths the current directory and the
//! user config directory (`~/.config/glados` on Linux) are searched.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Serialized};
#[cfg(feature = "toml-config")]
use figment::providers::{Format, Toml};
use tracing::{debug, info};

use super::error::{ConfigError, ConfigResult};
use super::schema::GladosConfig;

const ENV_PREFIX: &str = "GLADOS_";
const PROFILE_VAR: &str = "GLADOS_PROFILE";
const FILE_NAMES: [&str; 2] = ["glados.toml", "config.toml"];

/// Collects configuration sources and extracts a [`GladosConfig`].
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    profile: Option<String>,
    search_paths: Vec<PathBuf>,
    file: Option<PathBuf>,
    env: bool,
    overrides: Vec<GladosConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        let profile = std::env::var(PROFILE_VAR)
            .ok()
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty());
        Self {
            profile,
            search_paths: Vec::new(),
            file: None,
            env: true,
            overrides: Vec::new(),
        }
    }

    /// Selects `glados.<profile>.toml` as an extra layer.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        let profile = profile.as_ref().trim().to_ascii_lowercase();
        self.profile = (!profile.is_empty()).then_some(profile);
        self
    }

    /// Adds a directory to search; the first one added is tried first.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Reads exactly this file instead of searching. It must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Ignores `GLADOS_*` variables.
    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Layers `config` over every other source.
    pub fn merge(mut self, config: GladosConfig) -> Self {
        self.overrides.push(config);
        self
    }

    pub fn load(self) -> ConfigResult<GladosConfig> {
        let config: GladosConfig = self
            .figment()?
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        debug!(
            profile = self.profile.as_deref().unwrap_or("-"),
            level = %config.logging.level,
            debug_mode = config.gateway.debug,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn figment(&self) -> ConfigResult<Figment> {
        let files = match &self.file {
            Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path.clone())),
            Some(path) => vec![path.clone()],
            None => self.discover(),
        };

        let mut figment = Figment::from(Serialized::defaults(GladosConfig::default()));
        for path in &files {
            info!(path = %path.display(), "Reading configuration file");
            figment = merge_file(figment, path)?;
        }
        if self.env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["PROFILE"]).split("__"));
        }
        Ok(self
            .overrides
            .iter()
            .fold(figment, |figment, config| figment.merge(Serialized::defaults(config))))
    }

    /// Files to layer, lowest priority first.
    fn discover(&self) -> Vec<PathBuf> {
        let dirs = if self.search_paths.is_empty() {
            default_search_paths()
        } else {
            self.search_paths.clone()
        };

        for dir in &dirs {
            for name in FILE_NAMES {
                let base = dir.join(name);
                if !base.is_file() {
                    continue;
                }
                let mut files = Vec::with_capacity(2);
                if let Some(profile) = &self.profile {
                    let stem = name.trim_end_matches(".toml");
                    let variant = dir.join(format!("{stem}.{profile}.toml"));
                    if variant.is_file() {
                        files.push(variant);
                    }
                }
                files.push(base);
                return files;
            }
        }
        debug!("No configuration file found, using defaults");
        Vec::new()
    }
}

fn default_search_paths() -> Vec<PathBuf> {
    std::env::current_dir()
        .ok()
        .into_iter()
        .chain(dirs::config_dir().map(|dir| dir.join("glados")))
        .collect()
}

fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    match path.extension().and_then(|e| e.to_str()) {
        #[cfg(feature = "toml-config")]
        Some("toml") => Ok(figment.merge(Toml::file(path))),
        other => Err(ConfigError::ParseError(format!(
            "unsupported configuration format: {}",
            other.unwrap_or("(none)")
        ))),
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<GladosConfig> {
    ConfigLoader::new().load()
}

/// Loads `path` plus environment overrides.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<GladosConfig> {
    ConfigLoader::new().file(path).load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_defaults_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::new()
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.gateway.bot_name, "glados");
        assert_eq!(config.gateway.tick_secs, 60);
        assert!(!config.gateway.debug);
    }

    #[test]
    fn test_profile_name_is_normalized() {
        let loader = ConfigLoader::new().profile(" Staging ");
        assert_eq!(loader.profile.as_deref(), Some("staging"));
        assert_eq!(ConfigLoader::new().profile("").profile, None);
    }

    #[test]
    fn test_discover_uses_first_directory_with_a_file() {
        let empty = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("config.toml"), "").unwrap();

        let files = ConfigLoader::new()
            .search_path(empty.path())
            .search_path(second.path())
            .discover();
        assert_eq!(files, [second.path().join("config.toml")]);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_file_and_profile_layering() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("glados.toml"),
            "[gateway]\ndebug = true\nbot_name = \"wheatley\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("glados.production.toml"),
            "[gateway]\ntick_secs = 5\nbot_name = \"ignored\"\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .profile("production")
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();

        assert!(config.gateway.debug);
        assert_eq!(config.gateway.tick_secs, 5);
        // The main file is merged after the profile file.
        assert_eq!(config.gateway.bot_name, "wheatley");
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = ConfigLoader::new()
            .file("/nonexistent/glados.toml")
            .without_env()
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_programmatic_override() {
        let dir = tempfile::tempdir().unwrap();
        let mut overrides = GladosConfig::default();
        overrides.logging.level = LogLevel::Debug;
        overrides.gateway.commit_after_handle = true;

        let config = ConfigLoader::new()
            .search_path(dir.path())
            .without_env()
            .merge(overrides)
            .load()
            .unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.gateway.commit_after_handle);
    }
}
