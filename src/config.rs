//! Configuration management for the prediction service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "HEART_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub artifacts: ArtifactsConfig,
    pub pipeline: PipelineConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Allow any origin, method and header
    pub cors_permissive: bool,
}

/// Fitted artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Model artifact (`.json` logistic regression or `.onnx`)
    pub model_path: PathBuf,
    /// Preprocessor artifact written by `fit_preprocessor`
    pub preprocessor_path: PathBuf,
    /// Number of threads for ONNX inference
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

/// Prediction pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Largest accepted batch
    pub max_batch_size: usize,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between logged summaries, 0 disables the reporter
    pub report_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from `HEART_CONFIG` or the default path, then the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration layered as defaults, optional file, `HEART__*` variables
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let defaults = Config::try_from(&AppConfig::default())
            .context("Failed to build default configuration")?;

        let config = Config::builder()
            .add_source(defaults)
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("HEART")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// `host:port` string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                cors_permissive: true,
            },
            artifacts: ArtifactsConfig {
                model_path: PathBuf::from("models/best_model.json"),
                preprocessor_path: PathBuf::from("models/preprocessor.json"),
                onnx_threads: default_onnx_threads(),
            },
            pipeline: PipelineConfig {
                max_batch_size: 1000,
            },
            metrics: MetricsConfig {
                report_interval_secs: 60,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
