use std::path::PathBuf;

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub cleaning: CleaningConfig,
    pub training: TrainingConfig,
    pub server: ServerConfig,
}

/// Thresholds used by the row validator.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CleaningConfig {
    /// Maximum tolerated fraction of missing fields per row.
    pub row_missing_threshold: f64,
    /// Column missing-rate above which rows missing that column are dropped.
    pub column_missing_threshold: f64,
    /// When true, any missing field drops the row.
    pub strict: bool,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            row_missing_threshold: 0.5,
            column_missing_threshold: 0.5,
            strict: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TrainingConfig {
    /// Fraction of engineered rows held out for evaluation.
    pub holdout_fraction: f64,
    /// Seed for the train/hold-out shuffle, fixed for reproducibility.
    pub seed: u64,
    /// Number of folds for cross-validated MAE on the train partition.
    pub cv_folds: usize,
    /// Elastic-net penalty strength.
    pub penalty: f64,
    /// Elastic-net L1/L2 mixing ratio (0 = ridge, 1 = lasso).
    pub l1_ratio: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            holdout_fraction: 0.2,
            seed: 42,
            cv_folds: 5,
            penalty: 0.1,
            l1_ratio: 0.1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the persisted model bundle.
    pub model_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            model_dir: PathBuf::from("ml_models"),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // Load .env file (silently ignore if not present)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("meteo-forecast");

        let builder = Config::builder()
            // 1. Load default values
            // Cleaning
            .set_default("cleaning.row_missing_threshold", 0.5)?
            .set_default("cleaning.column_missing_threshold", 0.5)?
            .set_default("cleaning.strict", false)?
            // Training
            .set_default("training.holdout_fraction", 0.2)?
            .set_default("training.seed", 42)?
            .set_default("training.cv_folds", 5)?
            .set_default("training.penalty", 0.1)?
            .set_default("training.l1_ratio", 0.1)?
            // Server
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("server.model_dir", "ml_models")?
            // 2. Load from local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))
            // 3. Load from user config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false))
            // 4. Load from environment variables (METEO_SERVER__PORT=...)
            .add_source(Environment::with_prefix("METEO").separator("__"));

        let s = builder.build()?;
        Ok(s.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleaning_config_defaults() {
        let config = CleaningConfig::default();
        assert_eq!(config.row_missing_threshold, 0.5);
        assert_eq!(config.column_missing_threshold, 0.5);
        assert!(!config.strict);
    }

    #[test]
    fn test_training_config_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.holdout_fraction, 0.2);
        assert_eq!(config.seed, 42);
        assert_eq!(config.cv_folds, 5);
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.model_dir, PathBuf::from("ml_models"));
    }
}
