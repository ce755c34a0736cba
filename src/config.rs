//! TOML configuration for orderbot.
//!
//! Layered: an explicit path, then the `ORDERBOT_CONFIG` environment variable,
//! then `./orderbot.toml`, then compiled-in defaults.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "ORDERBOT_CONFIG";
/// Config file picked up from the working directory.
pub const LOCAL_CONFIG: &str = "orderbot.toml";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderbotConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl OrderbotConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded orderbot configuration");
        Ok(config)
    }

    /// Try `ORDERBOT_CONFIG`, then `./orderbot.toml`, then defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "ORDERBOT_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// An explicit path must load; without one, fall back through the layers.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::load_or_default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatch.processing_ms == 0 {
            anyhow::bail!("dispatch.processing_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize configuration")
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Time a bot spends on one order, in milliseconds.
    pub processing_ms: u64,
}

impl DispatchConfig {
    pub fn processing(&self) -> Duration {
        Duration::from_millis(self.processing_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            processing_ms: 10_000,
        }
    }
}

/// Log output settings. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
