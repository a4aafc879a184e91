//! Agora configuration file handling
//!
//! Provides default configuration generation and loading for the agora CLI.
//! Configuration files are TOML format and stored adjacent to the database.
//!
//! This file contains OPERATOR configuration only - deployment settings
//! (database path, logging). Governance parameters (quorum, unity, minimum
//! proposal duration) live per space in the database and are managed with
//! the space administration subcommands, not here.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Agora CLI configuration (operator settings only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgoraConfig {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database holding spaces and proposals
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Default data directory: `~/.local/share/agora` (platform equivalent).
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agora")
}

/// Default config file location, adjacent to the database.
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

impl Default for AgoraConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: default_data_dir().join("agora.db"),
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl AgoraConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: AgoraConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Load the config at `path`, or fall back to defaults when the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        Ok(())
    }
}
