use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::features::Compositor;
use crate::features::builder::DEFAULT_MIN_TIME_STEPS;
use crate::features::composite::{CompositeError, DEFAULT_COMPOSITE_DAYS};

pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("Failed to read pipeline config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse pipeline config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Composite(#[from] CompositeError),
}

/// Pipeline tunables, read from the optional `PIPELINE_CONFIG` YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub composite_days: u32,
    pub min_time_steps: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            composite_days: DEFAULT_COMPOSITE_DAYS,
            min_time_steps: DEFAULT_MIN_TIME_STEPS,
        }
    }
}

impl PipelineSettings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let settings: PipelineSettings = serde_yaml::from_str(config_str)?;
        if settings.min_time_steps == 0 {
            return Err(ConfigError::Invalid {
                key: "min_time_steps",
                value: "0".to_string(),
            });
        }
        Ok(settings)
    }

    pub fn compositor(&self) -> Result<Compositor, ConfigError> {
        Ok(Compositor::new(self.composite_days)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStoreKind {
    Memory,
    DynamoDb { table: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub jwt_secret: String,
    pub job_store: JobStoreKind,
    pub observation_api_url: Option<String>,
    pub tile_api_url: Option<String>,
    pub pipeline: PipelineSettings,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value })?,
            None => DEFAULT_PORT,
        };
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let job_store = match get("JOB_STORE").as_deref() {
            None | Some("memory") => JobStoreKind::Memory,
            Some("dynamodb") => JobStoreKind::DynamoDb {
                table: get("DYNAMODB_JOBS_TABLE").ok_or(ConfigError::Missing("DYNAMODB_JOBS_TABLE"))?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "JOB_STORE",
                    value: other.to_string(),
                });
            }
        };

        let pipeline = match get("PIPELINE_CONFIG") {
            Some(path) => PipelineSettings::load(Path::new(&path))?,
            None => PipelineSettings::default(),
        };

        let cors_origins = match get("CORS_ORIGINS") {
            Some(origins) => origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None => vec![DEFAULT_CORS_ORIGIN.to_string()],
        };

        Ok(Self {
            port,
            jwt_secret,
            job_store,
            observation_api_url: get("OBSERVATION_API_URL"),
            tile_api_url: get("TILE_API_URL"),
            pipeline,
            cors_origins,
        })
    }
}
