//! Configuration for the watch bridge.
//!
//! Layered configuration:
//! - Default values
//! - TOML configuration file (`.watchbridge/settings.toml`)
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `WATCHBRIDGE_` and use double
//! underscores to separate nested levels:
//! - `WATCHBRIDGE_SERVER__PORT=4000` sets `server.port`
//! - `WATCHBRIDGE_PUBLISH__MODE=file` sets `publish.mode`
//! - `WATCHBRIDGE_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory holding the settings file, searched for from the current dir up.
pub const CONFIG_DIR: &str = ".watchbridge";
const SETTINGS_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "WATCHBRIDGE_";

/// Errors writing the settings file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file already exists at {}. Use --force to overwrite", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Socket server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// How the listening address is handed to the host
    #[serde(default)]
    pub publish: PublishConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// Interface to bind; keep this on loopback
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind; 0 lets the OS choose
    #[serde(default)]
    pub port: u16,

    /// Maximum concurrent sessions; 0 means unlimited
    #[serde(default)]
    pub max_sessions: usize,
}

/// Where the bound address is published.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PublishMode {
    /// One JSON line on stdout
    Stdout,
    /// JSON file at `publish.path`
    File,
    /// Log only
    None,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PublishConfig {
    #[serde(default = "default_publish_mode")]
    pub mode: PublishMode,

    /// Target file for `mode = "file"`
    #[serde(default = "default_publish_path")]
    pub path: PathBuf,

    /// Plugin name sent along with the address
    #[serde(default = "default_plugin")]
    pub plugin: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `watchbridge = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_publish_mode() -> PublishMode {
    PublishMode::Stdout
}
fn default_publish_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("address.json")
}
fn default_plugin() -> String {
    "watchbridge-plugin".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerConfig::default(),
            publish: PublishConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            max_sessions: 0,
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            mode: default_publish_mode(),
            path: default_publish_path(),
            plugin: default_plugin(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Settings file in effect: the nearest `.watchbridge/settings.toml`
    /// above the current directory, else the one in the current directory
    pub fn config_path() -> PathBuf {
        Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE))
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path))
            // Double underscore separates nesting; single underscores stay in field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the settings file by looking for `.watchbridge` from the current
    /// directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(SETTINGS_FILE))
    }

    /// Directory containing `.watchbridge`, if any
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Check if the settings file exists and parses
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'watchbridge init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let write_err = |source: std::io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string).map_err(write_err)
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, ConfigError> {
        let config_path = PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err(ConfigError::AlreadyExists { path: config_path });
        }

        Settings::default().save(&config_path)?;

        Ok(config_path)
    }
}
