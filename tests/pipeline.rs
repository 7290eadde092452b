//! End-to-end pipeline tests: raw CSV in, served prediction out.
//!
//! A synthetic raw export is cleaned on disk, read back, trained on and the
//! resulting bundle loaded into a predictor, exercising every stage with the
//! same artifacts the CLI produces.

use std::fs;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use meteo_forecast::config::{CleaningConfig, TrainingConfig};
use meteo_forecast::ingest::{CsvCleaner, read_observations};
use meteo_forecast::ml::training::train;
use meteo_forecast::ml::{CurrentConditions, WeatherPredictor};
use meteo_forecast::{MockClock, ModelBundle};
use tempfile::tempdir;

const RAW_HEADER: &str = "Forecast timestamp;Position;2 metre temperature;\
                          2 metre relative humidity;10m wind speed;Total precipitation";

fn cleaning_config() -> CleaningConfig {
    CleaningConfig {
        row_missing_threshold: 0.5,
        column_missing_threshold: 0.5,
        strict: false,
    }
}

fn training_config() -> TrainingConfig {
    TrainingConfig {
        holdout_fraction: 0.2,
        seed: 42,
        cv_folds: 5,
        penalty: 0.1,
        l1_ratio: 0.1,
    }
}

/// Raw export with constant temperature and humidity; wind and
/// precipitation vary so the feature matrix is not fully degenerate.
fn write_raw_csv(path: &std::path::Path, rows: usize) {
    let mut csv = String::from(RAW_HEADER);
    csv.push('\n');
    for i in 0..rows {
        let wind = 5.0 + (i % 7) as f64;
        let precip = (i % 3) as f64 * 0.2;
        csv.push_str(&format!(
            "2026-03-{:02} {:02}:00:00;47.37,8.54;20.0;50.0;{wind:.1};{precip:.1}\n",
            1 + i / 24,
            i % 24,
        ));
    }
    fs::write(path, csv).unwrap();
}

/// Clean, train, persist, reload and predict from a constant-weather export.
#[test]
fn test_full_pipeline_constant_weather() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw.csv");
    let cleaned = dir.path().join("raw_clean.csv");
    let model_dir = dir.path().join("models");

    write_raw_csv(&raw, 30);

    let stats = CsvCleaner::new(cleaning_config())
        .clean_file(&raw, &cleaned)
        .unwrap();
    assert_eq!(stats.initial_rows, 30);
    assert_eq!(stats.cleaned_rows, 30);
    assert_eq!(stats.removed_rows(), 0);

    let series = read_observations(&cleaned).unwrap();
    assert_eq!(series.len(), 30);

    let bundle = train(&series, &training_config()).unwrap();
    bundle.save(&model_dir).unwrap();

    let clock = Arc::new(MockClock::new(
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap(),
    ));
    let predictor = WeatherPredictor::load(&model_dir, clock).unwrap();

    let current = CurrentConditions {
        temperature: Some(serde_json::json!(20.0)),
        humidity: Some(serde_json::json!(50.0)),
        wind_speed: Some(serde_json::json!(0.0)),
        precipitation: Some(serde_json::json!(0.0)),
    };
    let forecast = predictor.predict(&current, &[]).unwrap();

    // On constant targets the regressors degenerate to the target mean.
    assert!((forecast.temperature - 20.0).abs() < 2.0);
    assert!((forecast.humidity - 50.0).abs() < 2.0);
}

/// Metadata survives the save/load cycle byte for byte.
#[test]
fn test_pipeline_metadata_roundtrip() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw.csv");
    let cleaned = dir.path().join("raw_clean.csv");
    let model_dir = dir.path().join("models");

    write_raw_csv(&raw, 80);
    CsvCleaner::new(cleaning_config())
        .clean_file(&raw, &cleaned)
        .unwrap();
    let series = read_observations(&cleaned).unwrap();
    let bundle = train(&series, &training_config()).unwrap();
    bundle.save(&model_dir).unwrap();

    let reloaded = ModelBundle::load(&model_dir).unwrap();
    assert_eq!(reloaded.metadata, bundle.metadata);
    assert_eq!(reloaded.metadata.model_type, "ElasticNet");
    assert_eq!(reloaded.metadata.prediction_horizon, "3 hours");
}

/// Cleaning an already-cleaned file drops nothing further.
#[test]
fn test_recleaning_drops_nothing() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw.csv");
    let once = dir.path().join("once.csv");
    let twice = dir.path().join("twice.csv");

    write_raw_csv(&raw, 48);
    let cleaner = CsvCleaner::new(cleaning_config());
    let first = cleaner.clean_file(&raw, &once).unwrap();
    let second = cleaner.clean_file(&once, &twice).unwrap();

    assert_eq!(first.cleaned_rows, second.cleaned_rows);
    assert_eq!(second.removed_rows(), 0);
    assert_eq!(
        read_observations(&once).unwrap().len(),
        read_observations(&twice).unwrap().len(),
    );
}

/// Retraining atomically replaces the previous bundle on disk.
#[test]
fn test_retraining_replaces_bundle() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw.csv");
    let cleaned = dir.path().join("raw_clean.csv");
    let model_dir = dir.path().join("models");

    write_raw_csv(&raw, 100);
    CsvCleaner::new(cleaning_config())
        .clean_file(&raw, &cleaned)
        .unwrap();
    let series = read_observations(&cleaned).unwrap();

    train(&series, &training_config()).unwrap().save(&model_dir).unwrap();
    let first = ModelBundle::load(&model_dir).unwrap();

    let mut config = training_config();
    config.seed = 7;
    train(&series, &config).unwrap().save(&model_dir).unwrap();
    let second = ModelBundle::load(&model_dir).unwrap();

    assert_ne!(first.metadata.training_date, second.metadata.training_date);
    assert!(!model_dir.with_file_name("models.staging").exists());
}
