//! Tracing infrastructure.
//!
//! Structured, async-aware logging built on `tracing` and
//! `tracing-subscriber`: environment-based filtering via `RUST_LOG`, plus
//! pretty, compact and JSON output formats.

use crate::config::Settings;
use crate::error::PipelineError;
use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Output format for tracing.
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Pretty-printed format with colors, for development.
    Pretty,
    /// Compact format without colors, for production.
    Compact,
    /// JSON format for log aggregation.
    Json,
}

/// Tracing configuration options.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level used when `RUST_LOG` is unset.
    pub level: Level,
    /// Output format.
    pub format: OutputFormat,
    /// Whether to enable ANSI colors (Pretty format only).
    pub with_ansi: bool,
    /// Whether to include thread names.
    pub with_thread_names: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Pretty,
            with_ansi: true,
            with_thread_names: true,
        }
    }
}

impl TracingConfig {
    /// Create a tracing config at the given level.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Create a tracing config from loaded settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        let level = parse_log_level(&settings.application.log_level)?;
        Ok(Self::new(level))
    }

    /// Set the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable ANSI colors.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Parse a settings log-level string into a tracing [`Level`].
pub fn parse_log_level(level: &str) -> Result<Level, PipelineError> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(PipelineError::Config(format!(
            "invalid log level '{other}', expected trace/debug/info/warn/error"
        ))),
    }
}

/// Install the global subscriber. Errors if one is already set.
pub fn try_init(config: &TracingConfig) -> Result<(), PipelineError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string().to_lowercase()));

    let fmt_layer = match config.format {
        OutputFormat::Pretty => fmt::layer()
            .with_ansi(config.with_ansi)
            .with_thread_names(config.with_thread_names)
            .boxed(),
        OutputFormat::Compact => fmt::layer()
            .compact()
            .with_ansi(false)
            .with_thread_names(config.with_thread_names)
            .boxed(),
        OutputFormat::Json => fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| PipelineError::Config(format!("failed to install subscriber: {e}")))
}

/// Install the global subscriber from loaded settings.
pub fn init_from_settings(settings: &Settings) -> Result<(), PipelineError> {
    try_init(&TracingConfig::from_settings(settings)?)
}
