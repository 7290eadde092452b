//! Feature engineering shared between training and serving.
//!
//! Both paths must produce vectors with the exact same named columns in the
//! exact same order; the ordered name list persisted with the model bundle is
//! the binding contract. Per tracked variable the columns are
//! {current, lag_1h, lag_3h, lag_6h, ma_6h, ma_24h}, followed by `hour` and
//! `day_of_week`.
//!
//! Training derives the calendar columns from the sequential row offset
//! (`hour = i % 24`, `day_of_week = (i / 24) % 7`) because the raw exports
//! encode only an elapsed hourly sequence, while serving derives them from
//! the wall clock. The two are not anchored to the same calendar; callers
//! should treat the calendar columns as cyclic positions, not real dates.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ingest::{ObservationSeries, WeatherVariable};

/// Backward offsets (in rows) of the lag columns.
pub const LAG_OFFSETS: [usize; 3] = [1, 3, 6];
/// Trailing window sizes of the rolling-mean columns.
pub const ROLLING_WINDOWS: [usize; 2] = [6, 24];
/// Rows at the start of a series that lack a defined 6 h lag.
pub const MAX_LAG: usize = 6;
/// Minimum history length for serving-time lags and rolling means.
pub const MIN_HISTORY: usize = 24;

/// Total number of feature columns.
pub const NUM_FEATURES: usize = WeatherVariable::ALL.len() * 6 + 2;

/// The ordered feature-name list. This order is persisted verbatim in the
/// model bundle and reproduced exactly at serving time.
pub fn feature_names() -> Vec<String> {
    let mut names = Vec::with_capacity(NUM_FEATURES);
    for var in WeatherVariable::ALL {
        let base = var.name();
        names.push(base.to_string());
        for lag in LAG_OFFSETS {
            names.push(format!("{base}_lag_{lag}h"));
        }
        for window in ROLLING_WINDOWS {
            names.push(format!("{base}_ma_{window}h"));
        }
    }
    names.push("hour".to_string());
    names.push("day_of_week".to_string());
    names
}

/// Mean over the trailing window ending at `i` (inclusive), using however
/// many rows exist when fewer than `window` are available.
fn trailing_mean(values: &[f64], i: usize, window: usize) -> f64 {
    let start = (i + 1).saturating_sub(window);
    let slice = &values[start..=i];
    slice.iter().sum::<f64>() / slice.len() as f64
}

/// One engineered row for series position `i`. Caller guarantees `i >= MAX_LAG`.
fn feature_row(per_var: &[Vec<f64>], i: usize) -> Vec<f64> {
    let mut row = Vec::with_capacity(NUM_FEATURES);
    for values in per_var {
        row.push(values[i]);
        for lag in LAG_OFFSETS {
            row.push(values[i - lag]);
        }
        for window in ROLLING_WINDOWS {
            row.push(trailing_mean(values, i, window));
        }
    }
    row.push((i % 24) as f64);
    row.push(((i / 24) % 7) as f64);
    row
}

/// Feature vectors for every series position with fully defined lags.
///
/// The first [`MAX_LAG`] rows are dropped, so the output always has
/// `series.len() - MAX_LAG` rows (zero when the series is shorter than that).
pub fn build_feature_matrix(series: &ObservationSeries) -> Vec<Vec<f64>> {
    let per_var: Vec<Vec<f64>> = WeatherVariable::ALL
        .iter()
        .map(|&v| series.values(v))
        .collect();

    (MAX_LAG..series.len())
        .map(|i| feature_row(&per_var, i))
        .collect()
}

/// Engineered training data: one feature row per usable timestep, aligned
/// with the label pair looking `horizon` rows ahead.
#[derive(Debug, Clone)]
pub struct EngineeredData {
    pub features: Vec<Vec<f64>>,
    pub temperature_targets: Vec<f64>,
    pub humidity_targets: Vec<f64>,
}

impl EngineeredData {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Build aligned (feature, label) pairs for supervised training.
///
/// Row `i` of the output pairs the features at series position `i` with the
/// temperature/humidity observed `horizon` positions later; positions without
/// a defined 6 h lag or without a label are dropped.
pub fn build_training_data(series: &ObservationSeries, horizon: usize) -> EngineeredData {
    let per_var: Vec<Vec<f64>> = WeatherVariable::ALL
        .iter()
        .map(|&v| series.values(v))
        .collect();
    let temperatures = series.values(WeatherVariable::Temperature);
    let humidities = series.values(WeatherVariable::Humidity);

    let n = series.len();
    let last = n.saturating_sub(horizon);

    let mut features = Vec::new();
    let mut temperature_targets = Vec::new();
    let mut humidity_targets = Vec::new();
    for i in MAX_LAG..last {
        features.push(feature_row(&per_var, i));
        temperature_targets.push(temperatures[i + horizon]);
        humidity_targets.push(humidities[i + horizon]);
    }

    EngineeredData {
        features,
        temperature_targets,
        humidity_targets,
    }
}

/// Errors from serving-time feature assembly.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeatureError {
    #[error("field '{field}' cannot be interpreted as a number: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Current-observation payload as received from clients.
///
/// Fields accept JSON numbers or numeric strings; an absent field falls back
/// to its documented default (temperature 20 degC, humidity 60 %, wind speed
/// 10, precipitation 0).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrentConditions {
    #[serde(default)]
    pub temperature: Option<Value>,
    #[serde(default)]
    pub humidity: Option<Value>,
    #[serde(default)]
    pub wind_speed: Option<Value>,
    #[serde(default)]
    pub precipitation: Option<Value>,
}

/// One trailing history point. A missing field falls back to the current
/// observation's value for that variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricalReading {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub precipitation: Option<f64>,
}

impl HistoricalReading {
    fn value(&self, var: WeatherVariable) -> Option<f64> {
        match var {
            WeatherVariable::Temperature => self.temperature,
            WeatherVariable::Humidity => self.humidity,
            WeatherVariable::WindSpeed => self.wind_speed,
            WeatherVariable::Precipitation => self.precipitation,
        }
    }
}

fn default_value(var: WeatherVariable) -> f64 {
    match var {
        WeatherVariable::Temperature => 20.0,
        WeatherVariable::Humidity => 60.0,
        WeatherVariable::WindSpeed => 10.0,
        WeatherVariable::Precipitation => 0.0,
    }
}

/// Coerce a JSON number or numeric string to f64.
fn coerce_numeric(value: &Value, field: &'static str) -> Result<f64, FeatureError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Null => return Ok(f64::NAN), // treated as absent by the caller
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(FeatureError::InvalidField {
            field,
            value: value.to_string(),
        }),
    }
}

impl CurrentConditions {
    /// Resolve each tracked variable to a number, applying defaults for
    /// absent fields and failing on uncoercible ones.
    pub fn resolve(&self) -> Result<HashMap<WeatherVariable, f64>, FeatureError> {
        let mut resolved = HashMap::new();
        for var in WeatherVariable::ALL {
            let raw = match var {
                WeatherVariable::Temperature => &self.temperature,
                WeatherVariable::Humidity => &self.humidity,
                WeatherVariable::WindSpeed => &self.wind_speed,
                WeatherVariable::Precipitation => &self.precipitation,
            };
            let value = match raw {
                Some(v) => {
                    let coerced = coerce_numeric(v, var.name())?;
                    if coerced.is_nan() {
                        default_value(var)
                    } else {
                        coerced
                    }
                }
                None => default_value(var),
            };
            resolved.insert(var, value);
        }
        Ok(resolved)
    }
}

/// Serving-time counterpart of the training feature builder.
///
/// Reconstructs a vector with exactly the columns (and column order) recorded
/// in the model bundle; any recorded name this assembler does not produce is
/// filled with 0.
#[derive(Debug, Clone)]
pub struct InferenceAssembler {
    feature_names: Vec<String>,
}

impl InferenceAssembler {
    /// Build an assembler for the given persisted feature-name list.
    pub fn new(feature_names: Vec<String>) -> Self {
        Self { feature_names }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Assemble one feature vector from the current observation and an
    /// optional trailing history window (chronological, oldest first).
    pub fn assemble(
        &self,
        current: &CurrentConditions,
        history: &[HistoricalReading],
        now: DateTime<Local>,
    ) -> Result<Vec<f64>, FeatureError> {
        let resolved = current.resolve()?;
        let mut computed: HashMap<String, f64> = HashMap::with_capacity(NUM_FEATURES);

        for var in WeatherVariable::ALL {
            let base = var.name();
            let current_value = resolved[&var];
            computed.insert(base.to_string(), current_value);

            if history.len() >= MIN_HISTORY {
                // Append the current observation as the newest point, then
                // index lags from the end of the combined sequence.
                let mut sequence: Vec<f64> = history
                    .iter()
                    .map(|r| r.value(var).unwrap_or(current_value))
                    .collect();
                sequence.push(current_value);
                let m = sequence.len();

                for lag in LAG_OFFSETS {
                    computed.insert(format!("{base}_lag_{lag}h"), sequence[m - lag - 1]);
                }
                for window in ROLLING_WINDOWS {
                    computed.insert(
                        format!("{base}_ma_{window}h"),
                        trailing_mean(&sequence, m - 1, window),
                    );
                }
            } else {
                // Insufficient history: every derived column collapses to the
                // current value.
                for lag in LAG_OFFSETS {
                    computed.insert(format!("{base}_lag_{lag}h"), current_value);
                }
                for window in ROLLING_WINDOWS {
                    computed.insert(format!("{base}_ma_{window}h"), current_value);
                }
            }
        }

        computed.insert("hour".to_string(), now.hour() as f64);
        computed.insert(
            "day_of_week".to_string(),
            now.weekday().num_days_from_monday() as f64,
        );

        Ok(self
            .feature_names
            .iter()
            .map(|name| computed.get(name).copied().unwrap_or(0.0))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Observation;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    fn test_series(n: usize) -> ObservationSeries {
        let observations = (0..n)
            .map(|i| Observation {
                timestamp: format!("t{i}"),
                latitude: 48.0,
                longitude: 2.0,
                temperature: 10.0 + i as f64,
                humidity: 40.0 + (i % 30) as f64,
                wind_speed: (i % 12) as f64,
                precipitation: 0.1 * i as f64,
            })
            .collect();
        ObservationSeries::new(observations)
    }

    #[test]
    fn test_feature_names_order() {
        let names = feature_names();

        assert_eq!(names.len(), NUM_FEATURES);
        assert_eq!(
            &names[..6],
            &[
                "temperature",
                "temperature_lag_1h",
                "temperature_lag_3h",
                "temperature_lag_6h",
                "temperature_ma_6h",
                "temperature_ma_24h",
            ]
        );
        assert_eq!(names[names.len() - 2], "hour");
        assert_eq!(names[names.len() - 1], "day_of_week");
    }

    #[test]
    fn test_lag_values() {
        let series = test_series(40);
        let matrix = build_feature_matrix(&series);

        // First surviving row is series position 6.
        let row = &matrix[0];
        assert_eq!(row[0], 16.0); // temperature at i=6
        assert_eq!(row[1], 15.0); // lag 1h
        assert_eq!(row[2], 13.0); // lag 3h
        assert_eq!(row[3], 10.0); // lag 6h
    }

    #[test]
    fn test_partial_window_rolling_mean() {
        let series = test_series(40);
        let matrix = build_feature_matrix(&series);

        // At i=6 only 7 values exist for the 24 h window; a partial-window mean
        // is valid, not an error: mean(10..=16) = 13.
        let row = &matrix[0];
        assert_relative_eq!(row[4], (11.0 + 12.0 + 13.0 + 14.0 + 15.0 + 16.0) / 6.0);
        assert_relative_eq!(row[5], 13.0);
    }

    #[test]
    fn test_calendar_features_from_offset() {
        let series = test_series(60);
        let matrix = build_feature_matrix(&series);

        // Row for series position 30: hour = 30 % 24 = 6, day = 30 / 24 = 1.
        let row = &matrix[30 - MAX_LAG];
        assert_eq!(row[NUM_FEATURES - 2], 6.0);
        assert_eq!(row[NUM_FEATURES - 1], 1.0);
    }

    #[test]
    fn test_target_alignment() {
        let series = test_series(40);
        let data = build_training_data(&series, 3);

        // Feature row 0 is series position 6; its label looks 3 rows ahead.
        assert_eq!(data.temperature_targets[0], 10.0 + 9.0);
        let temps = series.values(WeatherVariable::Temperature);
        for (k, target) in data.temperature_targets.iter().enumerate() {
            assert_eq!(*target, temps[MAX_LAG + k + 3]);
        }
        assert_eq!(data.len(), 40 - MAX_LAG - 3);
    }

    #[test]
    fn test_short_series_yields_nothing() {
        assert!(build_feature_matrix(&test_series(6)).is_empty());
        assert!(build_training_data(&test_series(8), 3).is_empty());
    }

    #[test]
    fn test_assembler_no_history_collapses_to_current() {
        let assembler = InferenceAssembler::new(feature_names());
        let current = CurrentConditions {
            temperature: Some(json!(21.5)),
            humidity: Some(json!(55)),
            wind_speed: Some(json!(3.0)),
            precipitation: Some(json!(0.0)),
        };
        let now = chrono::Local.with_ymd_and_hms(2026, 1, 5, 14, 0, 0).unwrap();

        let vector = assembler.assemble(&current, &[], now).unwrap();

        // Every lag/rolling column equals the current value.
        for v in &vector[..6] {
            assert_eq!(*v, 21.5);
        }
        for v in &vector[6..12] {
            assert_eq!(*v, 55.0);
        }
        // 2026-01-05 is a Monday.
        assert_eq!(vector[NUM_FEATURES - 2], 14.0);
        assert_eq!(vector[NUM_FEATURES - 1], 0.0);
    }

    #[test]
    fn test_assembler_with_history_uses_lags() {
        let assembler = InferenceAssembler::new(feature_names());
        let history: Vec<HistoricalReading> = (0..24)
            .map(|i| HistoricalReading {
                temperature: Some(i as f64),
                humidity: Some(50.0),
                wind_speed: Some(1.0),
                precipitation: Some(0.0),
            })
            .collect();
        let current = CurrentConditions {
            temperature: Some(json!(100.0)),
            humidity: Some(json!(50)),
            wind_speed: Some(json!(1)),
            precipitation: Some(json!(0)),
        };
        let now = chrono::Local.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();

        let vector = assembler.assemble(&current, &history, now).unwrap();

        // Combined sequence is [0..=23, 100]; lags count back from the end.
        assert_eq!(vector[0], 100.0);
        assert_eq!(vector[1], 23.0); // lag 1h
        assert_eq!(vector[2], 21.0); // lag 3h
        assert_eq!(vector[3], 18.0); // lag 6h
        assert_relative_eq!(vector[4], (20.0 + 21.0 + 22.0 + 23.0 + 100.0 + 19.0) / 6.0);
        let ma24: f64 = ((1..=23).sum::<i32>() as f64 + 100.0) / 24.0;
        assert_relative_eq!(vector[5], ma24);
    }

    #[test]
    fn test_assembler_unknown_feature_fills_zero() {
        let mut names = feature_names();
        names.push("pressure_lag_1h".to_string());
        let assembler = InferenceAssembler::new(names);
        let now = chrono::Local.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();

        let vector = assembler
            .assemble(&CurrentConditions::default(), &[], now)
            .unwrap();

        assert_eq!(vector.len(), NUM_FEATURES + 1);
        assert_eq!(*vector.last().unwrap(), 0.0);
    }

    #[test]
    fn test_current_conditions_defaults() {
        let resolved = CurrentConditions::default().resolve().unwrap();

        assert_eq!(resolved[&WeatherVariable::Temperature], 20.0);
        assert_eq!(resolved[&WeatherVariable::Humidity], 60.0);
        assert_eq!(resolved[&WeatherVariable::WindSpeed], 10.0);
        assert_eq!(resolved[&WeatherVariable::Precipitation], 0.0);
    }

    #[test]
    fn test_numeric_string_coercion() {
        let current = CurrentConditions {
            temperature: Some(json!("21.5")),
            ..Default::default()
        };
        let resolved = current.resolve().unwrap();

        assert_eq!(resolved[&WeatherVariable::Temperature], 21.5);
    }

    #[test]
    fn test_uncoercible_field_is_an_error() {
        let current = CurrentConditions {
            humidity: Some(json!("soggy")),
            ..Default::default()
        };

        let result = current.resolve();
        assert!(matches!(
            result,
            Err(FeatureError::InvalidField { field: "humidity", .. })
        ));
    }

    proptest! {
        /// The lag computation always drops exactly the first six rows.
        #[test]
        fn prop_lag_drop_count(n in 0usize..120) {
            let matrix = build_feature_matrix(&test_series(n));
            prop_assert_eq!(matrix.len(), n.saturating_sub(MAX_LAG));
        }

        /// Labels always look exactly `horizon` rows ahead of their feature row.
        #[test]
        fn prop_target_offset(n in 10usize..120) {
            let series = test_series(n);
            let data = build_training_data(&series, 3);
            let temps = series.values(WeatherVariable::Temperature);
            for (k, target) in data.temperature_targets.iter().enumerate() {
                prop_assert_eq!(*target, temps[MAX_LAG + k + 3]);
            }
        }
    }
}
