//! Model bundle persistence - save and load trained artifacts.
//!
//! A bundle directory holds the fitted scaler and both regressors as bincode
//! files plus a JSON metadata document. The metadata's ordered feature-name
//! list is the binding contract between training and serving. Saving writes
//! to a fresh sibling directory and swaps it into place so an interrupted
//! run never leaves a half-written bundle behind.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{LinearModel, StandardScaler};

pub const SCALER_FILE: &str = "scaler.bin";
pub const TEMPERATURE_MODEL_FILE: &str = "temperature_model.bin";
pub const HUMIDITY_MODEL_FILE: &str = "humidity_model.bin";
pub const METADATA_FILE: &str = "model_metadata.json";

/// Hold-out metrics for one prediction target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetMetrics {
    pub mae: f64,
    pub r2: f64,
    /// Cross-validated MAE on the train partition; reported, not used for
    /// model selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_mae: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub temperature: TargetMetrics,
    pub humidity: TargetMetrics,
}

/// The metadata document persisted next to the model artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Version for backward compatibility.
    pub version: u32,
    /// Ordered feature-name list; serving must reproduce it verbatim.
    pub feature_columns: Vec<String>,
    pub metrics: ModelMetrics,
    pub training_date: DateTime<Utc>,
    pub model_type: String,
    pub prediction_horizon: String,
    pub training_samples: usize,
}

impl ModelMetadata {
    /// Current bundle format version.
    pub const CURRENT_VERSION: u32 = 1;

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} bundle v{}: {} samples, temperature mae={:.2} r2={:.3}, \
             humidity mae={:.2} r2={:.3}, trained {}",
            self.model_type,
            self.version,
            self.training_samples,
            self.metrics.temperature.mae,
            self.metrics.temperature.r2,
            self.metrics.humidity.mae,
            self.metrics.humidity.r2,
            self.training_date.format("%Y-%m-%d %H:%M UTC"),
        )
    }
}

/// An immutable, versioned unit of fitted normalizer, regressors and
/// metadata. Created once per training run; replaced wholesale by retraining.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub scaler: StandardScaler,
    pub temperature_model: LinearModel,
    pub humidity_model: LinearModel,
    pub metadata: ModelMetadata,
}

/// Errors that can occur during bundle persistence.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("model bundle not found at {0}")]
    NotFound(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to encode {file}: {message}")]
    Encode { file: &'static str, message: String },
    #[error("failed to decode {file}: {message}")]
    Decode { file: &'static str, message: String },
    #[error("bundle version mismatch: expected <= v{expected}, found v{found}")]
    VersionMismatch { expected: u32, found: u32 },
}

impl ModelBundle {
    /// Save the bundle under `dir`, atomically replacing any previous bundle.
    pub fn save(&self, dir: &Path) -> Result<(), PersistenceError> {
        let staging = staging_dir(dir);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        write_bincode(&staging.join(SCALER_FILE), SCALER_FILE, &self.scaler)?;
        write_bincode(
            &staging.join(TEMPERATURE_MODEL_FILE),
            TEMPERATURE_MODEL_FILE,
            &self.temperature_model,
        )?;
        write_bincode(
            &staging.join(HUMIDITY_MODEL_FILE),
            HUMIDITY_MODEL_FILE,
            &self.humidity_model,
        )?;

        let json = serde_json::to_vec_pretty(&self.metadata).map_err(|e| {
            PersistenceError::Encode {
                file: METADATA_FILE,
                message: e.to_string(),
            }
        })?;
        fs::write(staging.join(METADATA_FILE), json)?;

        // Swap the finished bundle into place.
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::rename(&staging, dir)?;

        Ok(())
    }

    /// Load a bundle from `dir`.
    pub fn load(dir: &Path) -> Result<Self, PersistenceError> {
        if !dir.join(METADATA_FILE).exists() {
            return Err(PersistenceError::NotFound(dir.to_path_buf()));
        }

        let raw = fs::read(dir.join(METADATA_FILE))?;
        let metadata: ModelMetadata =
            serde_json::from_slice(&raw).map_err(|e| PersistenceError::Decode {
                file: METADATA_FILE,
                message: e.to_string(),
            })?;
        if metadata.version > ModelMetadata::CURRENT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: ModelMetadata::CURRENT_VERSION,
                found: metadata.version,
            });
        }

        Ok(Self {
            scaler: read_bincode(&dir.join(SCALER_FILE), SCALER_FILE)?,
            temperature_model: read_bincode(
                &dir.join(TEMPERATURE_MODEL_FILE),
                TEMPERATURE_MODEL_FILE,
            )?,
            humidity_model: read_bincode(&dir.join(HUMIDITY_MODEL_FILE), HUMIDITY_MODEL_FILE)?,
            metadata,
        })
    }
}

fn staging_dir(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "bundle".to_string());
    dir.with_file_name(format!("{name}.staging"))
}

fn write_bincode<T: Serialize>(
    path: &Path,
    file: &'static str,
    value: &T,
) -> Result<(), PersistenceError> {
    let bytes = bincode::serialize(value).map_err(|e| PersistenceError::Encode {
        file,
        message: e.to_string(),
    })?;
    fs::write(path, bytes)?;
    Ok(())
}

fn read_bincode<T: for<'de> Deserialize<'de>>(
    path: &Path,
    file: &'static str,
) -> Result<T, PersistenceError> {
    if !path.exists() {
        return Err(PersistenceError::NotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    bincode::deserialize(&bytes).map_err(|e| PersistenceError::Decode {
        file,
        message: e.to_string(),
    })
}
