//! Configuration management.
use crate::error::PipelineError;
use config::Config;
use serde::Deserialize;
use std::time::Duration;

/// Default admission buffer capacity.
pub const DEFAULT_POINT_QUEUE_LENGTH: usize = 10;
/// Default resolver worker pool size.
pub const DEFAULT_RESOLVER_POOL_SIZE: usize = 10;

/// Top-level settings, loaded from `config/<name>.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Application-wide settings.
    pub application: ApplicationSettings,
    /// Pipeline tuning.
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// Storage locations for file-backed sinks.
    #[serde(default)]
    pub storage: StorageSettings,
}

/// Application-wide settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    /// Human-readable application name.
    pub name: String,
    /// Log level string: trace, debug, info, warn or error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Tuning knobs for the concurrent pipeline.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineSettings {
    /// How many points the admission buffer holds before `put` blocks.
    #[serde(default = "default_point_queue_length")]
    pub point_queue_length: usize,
    /// How many points may resolve their slots concurrently.
    #[serde(default = "default_resolver_pool_size")]
    pub resolver_pool_size: usize,
    /// Deadline for draining on graceful shutdown, e.g. `"30s"`.
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            point_queue_length: DEFAULT_POINT_QUEUE_LENGTH,
            resolver_pool_size: DEFAULT_RESOLVER_POOL_SIZE,
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Storage locations for file-backed sinks.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Directory scan collections are written into.
    #[serde(default = "default_storage_path")]
    pub default_path: String,
    /// Collection file format, dispatched by `storage::create_sink`.
    #[serde(default = "default_storage_format")]
    pub default_format: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            default_path: default_storage_path(),
            default_format: default_storage_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_point_queue_length() -> usize {
    DEFAULT_POINT_QUEUE_LENGTH
}

fn default_resolver_pool_size() -> usize {
    DEFAULT_RESOLVER_POOL_SIZE
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_storage_path() -> String {
    "./data".to_string()
}

fn default_storage_format() -> String {
    "csv".to_string()
}

impl Settings {
    /// Load settings from `config/<name>.toml`, defaulting to `default`.
    pub fn new(config_name: Option<&str>) -> Result<Self, PipelineError> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .add_source(config::File::with_name(&config_path))
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        s.try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Parse settings from a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self, PipelineError> {
        toml::from_str(raw).map_err(|e| PipelineError::Config(e.to_string()))
    }
}
