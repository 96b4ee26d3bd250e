//! Configuration Loader
//!
//! Environment-aware loading: a base TOML file, an optional per-environment
//! override file, then environment variables. Every file is optional so a
//! bare deployment runs on defaults plus `DATABASE_URL`.

use super::error::{ConfigResult, ConfigurationError};
use super::QueueConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BASE_CONFIG_FILE: &str = "queue-core.toml";
pub const ENV_PREFIX: &str = "QUEUE";

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_directory: PathBuf,
    environment: String,
    environment_overrides: bool,
}

impl ConfigLoader {
    /// Loader for `config_dir` in the given environment
    pub fn new(config_dir: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            config_directory: config_dir.into(),
            environment: environment.into().to_lowercase(),
            environment_overrides: true,
        }
    }

    /// Loader for `./config` with the environment auto-detected
    pub fn from_env() -> Self {
        let config_dir = env::var("QUEUE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"));
        Self::new(config_dir, Self::detect_environment())
    }

    /// Ignore process environment variables; files and defaults only
    pub fn without_environment_overrides(mut self) -> Self {
        self.environment_overrides = false;
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    pub fn detect_environment() -> String {
        env::var("QUEUE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// Merge all sources and validate the result
    pub fn load(&self) -> ConfigResult<QueueConfig> {
        if self.config_directory.exists() && !self.config_directory.is_dir() {
            return Err(ConfigurationError::NotADirectory {
                path: self.config_directory.clone(),
            });
        }

        let base_path = self.config_directory.join(BASE_CONFIG_FILE);
        let env_path = self
            .config_directory
            .join(format!("{}.toml", self.environment));

        debug!(
            environment = %self.environment,
            base = %base_path.display(),
            overrides = %env_path.display(),
            "Loading queue configuration"
        );

        let mut builder = Config::builder()
            .add_source(File::from(base_path).format(FileFormat::Toml).required(false))
            .add_source(File::from(env_path).format(FileFormat::Toml).required(false));

        if self.environment_overrides {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
            if let Ok(url) = env::var("DATABASE_URL") {
                builder = builder.set_override("database.url", url)?;
            }
        }

        let config: QueueConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            environment = %self.environment,
            max_connections = config.database.max_connections,
            timezone = %config.queue.timezone_label,
            "Configuration loaded successfully"
        );

        Ok(config)
    }
}
