use sea_orm::ConnectOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HbsConfig {
    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default)]
    pub sqlx_logging: bool,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialHbsConfig {
    database_url: Option<String>,
    max_connections: Option<u32>,
    connect_timeout_secs: Option<u64>,
    log_dir: Option<String>,
    sqlx_logging: Option<bool>,
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    8
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl HbsConfig {
    /// Loads `.env`, then the optional TOML file, then the process environment.
    /// Environment values override the file.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path.map(Path::new) {
            Some(path) if path.exists() => read_file(path)?,
            _ => PartialHbsConfig::default(),
        };
        let env_config: PartialHbsConfig = envy::from_env()?;

        Self::merge(env_config, file_config)
    }

    fn merge(
        env_config: PartialHbsConfig,
        file_config: PartialHbsConfig,
    ) -> Result<Self, ConfigError> {
        Ok(HbsConfig {
            database_url: env_config
                .database_url
                .or(file_config.database_url)
                .ok_or(ConfigError::Missing("DATABASE_URL"))?,
            max_connections: env_config
                .max_connections
                .or(file_config.max_connections)
                .unwrap_or_else(default_max_connections),
            connect_timeout_secs: env_config
                .connect_timeout_secs
                .or(file_config.connect_timeout_secs)
                .unwrap_or_else(default_connect_timeout_secs),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            sqlx_logging: env_config
                .sqlx_logging
                .or(file_config.sqlx_logging)
                .unwrap_or(false),
        })
    }

    pub fn connect_options(&self) -> ConnectOptions {
        let mut opt = ConnectOptions::new(self.database_url.clone());
        opt.max_connections(self.max_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .sqlx_logging(self.sqlx_logging);
        opt
    }
}

fn read_file(path: &Path) -> Result<PartialHbsConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
