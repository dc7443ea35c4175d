use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{
    APP_NAME, DEFAULT_CACHE_FILE, DEFAULT_LOG_LEVEL, DEFAULT_PASS_THRESHOLD, ENV_PREFIX,
    LOCAL_CONFIG_PATH,
};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where and how the submission cache is stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Snapshot file
    pub path: PathBuf,
    /// Write through a temp file + rename instead of overwriting in place
    pub atomic_writes: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CACHE_FILE),
            atomic_writes: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Minimum percentage counted as a pass
    pub pass_threshold: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Load configuration from multiple sources
///
/// Precedence, lowest first: defaults, global config, `.subcache/config.toml`,
/// the explicit `--config` file, `SUBCACHE_*` environment variables.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut files = Vec::new();

    if let Some(dir) = config_dir() {
        let global_config = dir.join("config.toml");
        if global_config.exists() {
            files.push(global_config);
        }
    }

    let local_config = PathBuf::from(LOCAL_CONFIG_PATH);
    if local_config.exists() {
        files.push(local_config);
    }

    if let Some(path) = explicit {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
        files.push(path.to_path_buf());
    }

    figment_for(&files)
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("Failed to load configuration")
}

fn figment_for(files: &[PathBuf]) -> Figment {
    files.iter().fold(
        Figment::from(Serialized::defaults(Config::default())),
        |figment, file| figment.merge(Toml::file(file)),
    )
}

/// Platform config directory (~/.config/subcache on Linux)
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Save configuration to file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let toml_string = toml::to_string_pretty(config)?;
    std::fs::write(path, toml_string)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

/// Create a default global configuration file if it doesn't exist
pub fn init_config() -> Result<PathBuf> {
    let config_file = config_dir()
        .context("Could not determine configuration directory")?
        .join("config.toml");

    if !config_file.exists() {
        save_config(&Config::default(), &config_file)?;
    }

    Ok(config_file)
}
