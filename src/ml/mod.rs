//! Machine Learning module for short-term weather prediction.
//!
//! Training fits a normalizer and two independent regressors (temperature,
//! humidity) on lagged, time-windowed features; serving reconstructs the
//! same feature vectors and runs the persisted models.

pub mod confidence;
pub mod features;
pub mod model;
pub mod persistence;
pub mod training;

use std::path::Path;
use std::sync::Arc;

use crate::traits::Clock;

pub use confidence::{ConfidenceInterval, clamp_humidity, clamp_temperature};
pub use features::{CurrentConditions, FeatureError, HistoricalReading, InferenceAssembler};
pub use model::{LinearModel, ModelError, StandardScaler};
pub use persistence::{ModelBundle, ModelMetadata, PersistenceError};
pub use training::{TrainingError, train};

/// Forward offset between an observation and the target it predicts, in
/// series positions (hours).
pub const PREDICTION_HORIZON_HOURS: usize = 3;
/// Horizon label recorded in metadata and returned to API clients.
pub const HORIZON_LABEL: &str = "3 hours";
/// Model-family label recorded in metadata.
pub const MODEL_FAMILY: &str = "ElasticNet";

/// A clamped prediction pair for one location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forecast {
    /// Predicted temperature three hours ahead, degC, clamped to the
    /// physical range.
    pub temperature: f64,
    /// Predicted relative humidity three hours ahead, percent, clamped.
    pub humidity: f64,
}

/// Serving-time predictor around a loaded, read-only model bundle.
///
/// Constructed once at service start and shared immutably across requests;
/// "not yet loaded" lives in the caller's `Option`, not in here.
pub struct WeatherPredictor {
    bundle: ModelBundle,
    assembler: InferenceAssembler,
    clock: Arc<dyn Clock>,
}

impl WeatherPredictor {
    /// Wrap an already-loaded bundle.
    pub fn new(bundle: ModelBundle, clock: Arc<dyn Clock>) -> Self {
        let assembler = InferenceAssembler::new(bundle.metadata.feature_columns.clone());
        Self {
            bundle,
            assembler,
            clock,
        }
    }

    /// Load the bundle from disk and wrap it.
    pub fn load(dir: &Path, clock: Arc<dyn Clock>) -> Result<Self, PersistenceError> {
        Ok(Self::new(ModelBundle::load(dir)?, clock))
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.bundle.metadata
    }

    /// Predict conditions three hours ahead for one location.
    ///
    /// Raw model outputs are clamped to physically plausible ranges rather
    /// than rejected.
    pub fn predict(
        &self,
        current: &CurrentConditions,
        history: &[HistoricalReading],
    ) -> Result<Forecast, FeatureError> {
        let vector = self
            .assembler
            .assemble(current, history, self.clock.now_local())?;
        let scaled = self.bundle.scaler.transform_row(&vector);

        Ok(Forecast {
            temperature: clamp_temperature(self.bundle.temperature_model.predict_row(&scaled)),
            humidity: clamp_humidity(self.bundle.humidity_model.predict_row(&scaled)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::features::{NUM_FEATURES, feature_names};
    use crate::ml::persistence::{ModelMetrics, TargetMetrics};
    use crate::traits::{MockClock, SystemClock};
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    /// A bundle whose regressors ignore the inputs and always produce the
    /// given intercepts.
    fn constant_bundle(temperature: f64, humidity: f64) -> ModelBundle {
        let x = Array2::from_shape_fn((4, NUM_FEATURES), |(i, j)| (i * 31 + j) as f64);
        ModelBundle {
            scaler: StandardScaler::fit(&x),
            temperature_model: LinearModel {
                weights: vec![0.0; NUM_FEATURES],
                intercept: temperature,
            },
            humidity_model: LinearModel {
                weights: vec![0.0; NUM_FEATURES],
                intercept: humidity,
            },
            metadata: ModelMetadata {
                version: ModelMetadata::CURRENT_VERSION,
                feature_columns: feature_names(),
                metrics: ModelMetrics {
                    temperature: TargetMetrics { mae: 1.0, r2: 0.9, cv_mae: None },
                    humidity: TargetMetrics { mae: 3.0, r2: 0.8, cv_mae: None },
                },
                training_date: Utc::now(),
                model_type: MODEL_FAMILY.to_string(),
                prediction_horizon: HORIZON_LABEL.to_string(),
                training_samples: 50,
            },
        }
    }

    #[test]
    fn test_predict_clamps_to_physical_ranges() {
        let clock = Arc::new(MockClock::new(
            Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap(),
        ));

        let hot = WeatherPredictor::new(constant_bundle(75.0, 120.0), clock.clone());
        let forecast = hot.predict(&CurrentConditions::default(), &[]).unwrap();
        assert_eq!(forecast.temperature, 60.0);
        assert_eq!(forecast.humidity, 100.0);

        let cold = WeatherPredictor::new(constant_bundle(-60.0, -5.0), clock);
        let forecast = cold.predict(&CurrentConditions::default(), &[]).unwrap();
        assert_eq!(forecast.temperature, -50.0);
        assert_eq!(forecast.humidity, 0.0);
    }

    #[test]
    fn test_predict_in_range_untouched() {
        let predictor = WeatherPredictor::new(constant_bundle(18.5, 62.0), Arc::new(SystemClock));
        let forecast = predictor
            .predict(&CurrentConditions::default(), &[])
            .unwrap();

        assert_eq!(forecast.temperature, 18.5);
        assert_eq!(forecast.humidity, 62.0);
    }

    #[test]
    fn test_predict_rejects_uncoercible_input() {
        let predictor = WeatherPredictor::new(constant_bundle(20.0, 50.0), Arc::new(SystemClock));
        let current = CurrentConditions {
            temperature: Some(serde_json::json!("warm")),
            ..Default::default()
        };

        assert!(predictor.predict(&current, &[]).is_err());
    }

    #[test]
    fn test_load_missing_dir_fails() {
        let result = WeatherPredictor::load(Path::new("/nonexistent/bundle"), Arc::new(SystemClock));
        assert!(matches!(result, Err(PersistenceError::NotFound(_))));
    }
}
