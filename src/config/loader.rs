//! Configuration Loader
//!
//! Environment-aware loading: built-in defaults, then `diligence.toml`, then
//! `diligence.{environment}.toml`, then `DILIGENCE__*` environment variables.
//! The `agents` table, when a file provides it, replaces the default agent set
//! as a whole.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::OrchestratorConfig;

pub const ENV_PREFIX: &str = "DILIGENCE";
pub const ENV_SEPARATOR: &str = "__";
const BASE_FILE_NAME: &str = "diligence";

#[derive(Debug)]
pub struct ConfigManager {
    config: OrchestratorConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection from `./config`
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load from a directory with an explicit environment name, reading overrides
    /// from the process environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_overrides(config_dir, environment, None)
    }

    /// Load with an explicit override map standing in for the process environment.
    ///
    /// Keys use the same shape as real variables, e.g.
    /// `DILIGENCE__RESOLVER__POLL_INTERVAL_MS`.
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::build(&config_directory, environment, overrides)?;
        config.validate()?;

        info!(
            environment = environment,
            agent_types = config.agents.len(),
            max_attempts = config.dispatch.max_attempts,
            poll_interval_ms = config.resolver.poll_interval_ms,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: OrchestratorConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: PathBuf::from("config"),
        }))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn build(
        config_directory: &Path,
        environment: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<OrchestratorConfig> {
        let base = config_directory.join(format!("{BASE_FILE_NAME}.toml"));
        let env_specific = config_directory.join(format!("{BASE_FILE_NAME}.{environment}.toml"));

        for path in [&base, &env_specific] {
            if path.exists() {
                debug!("Merging configuration file {}", path.display());
            }
        }

        let settings = Config::builder()
            .add_source(File::from(base).format(FileFormat::Toml).required(false))
            .add_source(
                File::from(env_specific)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(overrides),
            )
            .build()?;

        settings
            .try_deserialize::<OrchestratorConfig>()
            .map_err(ConfigurationError::from)
    }

    fn detect_environment() -> String {
        env::var("DILIGENCE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}
