//! TOML Configuration File Support
//!
//! Centralized configuration loading for the native host, supporting a TOML
//! file at `~/.config/nativehost/host.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [app]
//! root = "/home/me/apps/demo"
//!
//! [backend]
//! program = "php"
//! args = ["-S", "127.0.0.1:{port}", "-t", "public"]
//! preferred_port = 8100
//! settings = { memory_limit = "512M" }
//!
//! [api]
//! port = 4000
//!
//! [scheduler]
//! enabled = true
//! interval_secs = 60
//! args = ["artisan", "schedule:run"]
//! ```
//!
//! `{port}` in backend arguments is replaced with the port offered to the
//! backend; `{api_port}` with the internal API server's port.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::BackendSettings;

/// Default port offered to the backend
pub const DEFAULT_BACKEND_PORT: u16 = 8100;

/// Default internal API server port
pub const DEFAULT_API_PORT: u16 = 4000;

/// Default scheduler interval
pub const DEFAULT_SCHEDULER_INTERVAL: Duration = Duration::from_secs(60);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[app]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppToml {
    /// Application root, the base path for extension discovery
    pub root: Option<PathBuf>,
}

/// `[backend]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Program to launch
    pub program: Option<String>,
    /// Program arguments, with `{port}`/`{api_port}` placeholders
    pub args: Option<Vec<String>>,
    /// Working directory (defaults to the application root)
    pub working_dir: Option<PathBuf>,
    /// Port offered to the backend
    pub preferred_port: Option<u16>,
    /// Ini-equivalent runtime settings
    pub settings: Option<BTreeMap<String, String>>,
}

/// `[api]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// Internal API server port
    pub port: Option<u16>,
}

/// `[scheduler]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerToml {
    /// Whether the scheduler runs
    pub enabled: Option<bool>,
    /// Seconds between runs
    pub interval_secs: Option<u64>,
    /// Arguments passed to the backend program for each run
    pub args: Option<Vec<String>>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostToml {
    /// Application section
    pub app: AppToml,
    /// Backend section
    pub backend: BackendToml,
    /// Internal API section
    pub api: ApiToml,
    /// Scheduler section
    pub scheduler: SchedulerToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// How to launch the backend process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    /// Program to launch
    pub program: String,
    /// Program arguments, with placeholders
    pub args: Vec<String>,
    /// Working directory; `None` means the application root
    pub working_dir: Option<PathBuf>,
    /// Port offered to the backend
    pub preferred_port: u16,
    /// Ini-equivalent runtime settings
    pub settings: BackendSettings,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            program: "php".to_string(),
            args: vec![
                "-S".to_string(),
                "127.0.0.1:{port}".to_string(),
                "-t".to_string(),
                "public".to_string(),
            ],
            working_dir: None,
            preferred_port: DEFAULT_BACKEND_PORT,
            settings: BackendSettings::new(),
        }
    }
}

/// Periodic scheduler settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Whether the scheduler runs
    pub enabled: bool,
    /// Time between runs
    pub interval: Duration,
    /// Arguments passed to the backend program for each run
    pub args: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_SCHEDULER_INTERVAL,
            args: vec!["artisan".to_string(), "schedule:run".to_string()],
        }
    }
}

/// Centralized configuration for the native host
#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Application root
    pub app_root: PathBuf,

    /// Backend launch settings
    pub backend: BackendConfig,

    /// Internal API server port
    pub api_port: u16,

    /// Scheduler settings
    pub scheduler: SchedulerConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            app_root: PathBuf::from("."),
            backend: BackendConfig::default(),
            api_port: DEFAULT_API_PORT,
            scheduler: SchedulerConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl HostConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Directory the backend runs in
    #[must_use]
    pub fn backend_working_dir(&self) -> PathBuf {
        self.backend
            .working_dir
            .clone()
            .unwrap_or_else(|| self.app_root.clone())
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a zero port, a zero scheduler interval or
    /// an empty backend program.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_port == 0 {
            return Err(ConfigError::ValidationError(
                "api.port must be non-zero".to_string(),
            ));
        }
        if self.backend.preferred_port == 0 {
            return Err(ConfigError::ValidationError(
                "backend.preferred_port must be non-zero".to_string(),
            ));
        }
        if self.backend.program.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backend.program must not be empty".to_string(),
            ));
        }
        if self.scheduler.interval < Duration::from_secs(1) {
            return Err(ConfigError::ValidationError(
                "scheduler.interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/nativehost/host.toml` or
/// `~/.config/nativehost/host.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("nativehost").join("host.toml"))
}

/// Load configuration from the default path, then the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the result fails validation. A missing file is not an error.
pub fn load_config() -> Result<HostConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the result
/// fails validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<HostConfig, ConfigError> {
    let mut config = HostConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: HostToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut HostConfig, toml: &HostToml) {
    if let Some(ref root) = toml.app.root {
        config.app_root = root.clone();
    }

    if let Some(ref program) = toml.backend.program {
        config.backend.program = program.clone();
    }
    if let Some(ref args) = toml.backend.args {
        config.backend.args = args.clone();
    }
    if toml.backend.working_dir.is_some() {
        config.backend.working_dir = toml.backend.working_dir.clone();
    }
    if let Some(port) = toml.backend.preferred_port {
        config.backend.preferred_port = port;
    }
    if let Some(ref settings) = toml.backend.settings {
        config.backend.settings = BackendSettings::from(settings.clone());
    }

    if let Some(port) = toml.api.port {
        config.api_port = port;
    }

    if let Some(enabled) = toml.scheduler.enabled {
        config.scheduler.enabled = enabled;
    }
    if let Some(secs) = toml.scheduler.interval_secs {
        config.scheduler.interval = Duration::from_secs(secs);
    }
    if let Some(ref args) = toml.scheduler.args {
        config.scheduler.args = args.clone();
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut HostConfig) {
    apply_env_vars(config, |name| std::env::var(name).ok());
}

fn apply_env_vars(config: &mut HostConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(root) = var("NATIVEHOST_APP_ROOT") {
        config.app_root = PathBuf::from(root);
        config.source = ConfigSource::Env;
    }
    if let Some(program) = var("NATIVEHOST_BACKEND") {
        config.backend.program = program;
        config.source = ConfigSource::Env;
    }
    if let Some(port) = var("NATIVEHOST_BACKEND_PORT") {
        if let Ok(port) = port.parse::<u16>() {
            config.backend.preferred_port = port;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(port) = var("NATIVEHOST_API_PORT") {
        if let Ok(port) = port.parse::<u16>() {
            config.api_port = port;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(enabled) = var("NATIVEHOST_SCHEDULER") {
        config.scheduler.enabled = enabled != "0" && enabled.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
    if let Some(interval) = var("NATIVEHOST_SCHEDULER_INTERVAL") {
        if let Ok(secs) = interval.parse::<u64>() {
            config.scheduler.interval = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Application root override
    pub app_root: Option<PathBuf>,

    /// Backend program override
    pub backend_program: Option<String>,

    /// Backend port override
    pub backend_port: Option<u16>,

    /// API port override
    pub api_port: Option<u16>,

    /// Scheduler enabled override
    pub scheduler_enabled: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set application root override
    #[must_use]
    pub fn with_app_root(mut self, root: PathBuf) -> Self {
        self.app_root = Some(root);
        self
    }

    /// Set backend program override
    #[must_use]
    pub fn with_backend_program(mut self, program: String) -> Self {
        self.backend_program = Some(program);
        self
    }

    /// Set backend port override
    #[must_use]
    pub fn with_backend_port(mut self, port: u16) -> Self {
        self.backend_port = Some(port);
        self
    }

    /// Set API port override
    #[must_use]
    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api_port = Some(port);
        self
    }

    /// Set scheduler enabled override
    #[must_use]
    pub fn with_scheduler_enabled(mut self, enabled: bool) -> Self {
        self.scheduler_enabled = Some(enabled);
        self
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if an override produces an invalid value.
    pub fn apply(&self, config: &mut HostConfig) -> Result<(), ConfigError> {
        if self.app_root.is_some()
            || self.backend_program.is_some()
            || self.backend_port.is_some()
            || self.api_port.is_some()
            || self.scheduler_enabled.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref root) = self.app_root {
            config.app_root = root.clone();
        }
        if let Some(ref program) = self.backend_program {
            config.backend.program = program.clone();
        }
        if let Some(port) = self.backend_port {
            config.backend.preferred_port = port;
        }
        if let Some(port) = self.api_port {
            config.api_port = port;
        }
        if let Some(enabled) = self.scheduler_enabled {
            config.scheduler.enabled = enabled;
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn parse(toml_content: &str) -> HostConfig {
        let toml_config: HostToml = toml::from_str(toml_content).unwrap();
        let mut config = HostConfig::default();
        apply_toml_config(&mut config, &toml_config);
        config
    }

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();

        assert_eq!(config.backend.program, "php");
        assert_eq!(config.backend.preferred_port, 8100);
        assert_eq!(config.api_port, 4000);
        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.interval, Duration::from_secs(60));
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("nativehost/host.toml"));
        }
    }

    #[test]
    fn test_parse_valid_toml() {
        let config = parse(
            r#"
[app]
root = "/srv/demo"

[backend]
program = "php8.3"
args = ["artisan", "serve", "--port={port}"]
preferred_port = 9000
settings = { memory_limit = "512M", display_errors = "0" }

[api]
port = 4100

[scheduler]
enabled = false
interval_secs = 30
"#,
        );

        assert_eq!(config.app_root, PathBuf::from("/srv/demo"));
        assert_eq!(config.backend.program, "php8.3");
        assert_eq!(config.backend.args, vec!["artisan", "serve", "--port={port}"]);
        assert_eq!(config.backend.preferred_port, 9000);
        assert_eq!(config.backend.settings.get("memory_limit"), Some("512M"));
        assert_eq!(config.api_port, 4100);
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.interval, Duration::from_secs(30));
        assert_eq!(config.backend_working_dir(), PathBuf::from("/srv/demo"));
    }

    #[test]
    fn test_parse_empty_toml() {
        let config = parse("");
        assert_eq!(config.backend, BackendConfig::default());
        assert_eq!(config.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn test_missing_file_graceful() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config_from_path(Some(dir.path().join("absent.toml")));
        let config = result.unwrap();
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_malformed_toml_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[api]\nport = \"not a number\"\n").unwrap();

        let result = load_config_from_path(Some(file.path().to_path_buf()));
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = parse("[api]\nport = 4100\n[backend]\npreferred_port = 9000\n");
        config.set_source(ConfigSource::File);

        apply_env_vars(
            &mut config,
            env(&[
                ("NATIVEHOST_API_PORT", "4200"),
                ("NATIVEHOST_SCHEDULER", "false"),
                ("NATIVEHOST_BACKEND_PORT", "not-a-port"),
            ]),
        );

        assert_eq!(config.api_port, 4200);
        assert!(!config.scheduler.enabled);
        assert_eq!(config.backend.preferred_port, 9000);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = HostConfig::default();
        apply_env_vars(&mut config, env(&[("NATIVEHOST_BACKEND", "php-env")]));

        ConfigOverrides::new()
            .with_backend_program("php-cli".to_string())
            .with_api_port(4300)
            .apply(&mut config)
            .unwrap();

        assert_eq!(config.backend.program, "php-cli");
        assert_eq!(config.api_port, 4300);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_config_overrides_empty_no_change() {
        let mut config = HostConfig::default();
        ConfigOverrides::new().apply(&mut config).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_validation_rejects_zero_port_and_interval() {
        let mut config = HostConfig::default();
        let err = ConfigOverrides::new()
            .with_api_port(0)
            .apply(&mut config)
            .unwrap_err();
        assert!(err.to_string().contains("api.port"));

        let config = parse("[scheduler]\ninterval_secs = 0\n");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI");
        assert_eq!(ConfigSource::Env.to_string(), "environment");
        assert_eq!(ConfigSource::File.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }
}
