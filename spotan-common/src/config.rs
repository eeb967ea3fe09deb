//! Bootstrap configuration loading and root folder resolution
//!
//! The TOML file carries everything needed before the database is open:
//! database location, logging level, remote service credentials and the
//! ingestion tuning knobs. All fields are optional; built-in defaults apply.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "SPOTAN_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "spotan.db";

/// Records processed concurrently when nothing else is configured
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Age in days after which a cached artist, album or track is refetched
pub const DEFAULT_STALE_AFTER_DAYS: u32 = 7;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit database path, overrides `<root_folder>/spotan.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Remote metadata service settings
    #[serde(default)]
    pub spotify: SpotifyConfig,

    /// Ingestion tuning
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log filter (trace, debug, info, warn, error, or a full filter directive)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Spotify Web API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpotifyConfig {
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    /// Client-side request ceiling, applied before every remote call
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            requests_per_second: default_requests_per_second(),
        }
    }
}

/// Ingestion tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Number of records processed concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Age after which a cached artist/album/track is refetched
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            stale_after_days: default_stale_after_days(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_stale_after_days() -> u32 {
    DEFAULT_STALE_AFTER_DAYS
}

impl TomlConfig {
    /// Load configuration from an explicit path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from an explicit path, or the platform default location if present,
    /// or fall back to built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.ingest.concurrency == 0 {
            return Err(Error::Config("ingest.concurrency must be at least 1".to_string()));
        }
        if self.spotify.requests_per_second == 0 {
            return Err(Error::Config(
                "spotify.requests_per_second must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Write configuration to a TOML file (creating parent folders)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    get_default_root_folder()
}

/// Database path: explicit CLI/TOML path, else `<root_folder>/spotan.db`
pub fn resolve_database_path(
    cli_arg: Option<&Path>,
    toml_config: &TomlConfig,
    root_folder: &Path,
) -> PathBuf {
    cli_arg
        .map(Path::to_path_buf)
        .or_else(|| toml_config.database_path.clone())
        .unwrap_or_else(|| root_folder.join(DATABASE_FILE_NAME))
}

/// Platform default configuration file (`<config_dir>/spotan/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("spotan").join("config.toml"))
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("spotan"))
        .unwrap_or_else(|| PathBuf::from("./spotan_data"))
}
