//! Configuration management for the Restaurant Costing Engine
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with COSTING_ prefix

use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{NegativeStockPolicy, DEFAULT_DRIFT_TOLERANCE};
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Per-tenant storage configuration
    pub database: DatabaseConfig,

    /// Costing policy
    pub costing: CostingConfig,

    /// Log output configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Directory holding one `<tenant>.db` file per organization
    pub data_dir: PathBuf,

    /// Maximum number of connections in each tenant's read pool
    pub max_connections: u32,

    /// Seconds a writer waits on a locked database file
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CostingConfig {
    /// Whether consumption may drive on-hand below zero
    pub negative_stock: NegativeStockPolicy,

    /// Deepest recipe nesting resolved before giving up
    pub max_composite_depth: usize,

    /// Allowed gap between an invoice total and its line sum
    #[serde(with = "rust_decimal::serde::str")]
    pub drift_tolerance: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `pretty` or `json`
    pub format: String,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> AppResult<Self> {
        let config = Self::build().map_err(|e| AppError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn build() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("COSTING_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("database.data_dir", "data")?
            .set_default("database.max_connections", 4)?
            .set_default("database.busy_timeout_secs", 5)?
            .set_default("costing.negative_stock", "reject")?
            .set_default("costing.max_composite_depth", 8)?
            .set_default("costing.drift_tolerance", DEFAULT_DRIFT_TOLERANCE.to_string())?
            .set_default("logging.format", "pretty")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (COSTING_ prefix)
            .add_source(
                Environment::with_prefix("COSTING")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if self.database.max_connections == 0 {
            return Err(AppError::Configuration(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.costing.max_composite_depth == 0 {
            return Err(AppError::Configuration(
                "costing.max_composite_depth must be at least 1".to_string(),
            ));
        }
        if self.costing.drift_tolerance < Decimal::ZERO {
            return Err(AppError::Configuration(format!(
                "costing.drift_tolerance must not be negative, got {}",
                self.costing.drift_tolerance
            )));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(AppError::Configuration(format!(
                "logging.format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            )));
        }
        Ok(())
    }

    /// Configuration rooted at `data_dir` with every other value at its default
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            environment: "test".to_string(),
            database: DatabaseConfig {
                data_dir: data_dir.into(),
                ..DatabaseConfig::default()
            },
            costing: CostingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            max_connections: 4,
            busy_timeout_secs: 5,
        }
    }
}

impl Default for CostingConfig {
    fn default() -> Self {
        Self {
            negative_stock: NegativeStockPolicy::Reject,
            max_composite_depth: 8,
            drift_tolerance: DEFAULT_DRIFT_TOLERANCE,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
        }
    }
}
