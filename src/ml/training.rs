//! Training orchestration: split, normalize, fit, evaluate, package.

use chrono::Utc;
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::info;

use crate::config::TrainingConfig;
use crate::ingest::ObservationSeries;

use super::features::{NUM_FEATURES, build_training_data, feature_names};
use super::model::{
    LinearModel, ModelError, StandardScaler, fit_regressor, mean_absolute_error, r_squared,
    require_finite,
};
use super::persistence::{ModelBundle, ModelMetadata, ModelMetrics, TargetMetrics};
use super::{HORIZON_LABEL, MODEL_FAMILY, PREDICTION_HORIZON_HOURS};

/// Minimum engineered rows before a split makes sense.
const MIN_TRAINING_ROWS: usize = 10;

/// Errors that can occur during a training run.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("no usable rows after feature/target alignment")]
    NoUsableRows,
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Run the full training pipeline on a validated series and return the
/// packaged bundle.
///
/// The engineered rows are shuffled with a fixed seed and split into train
/// and hold-out partitions; the scaler is fitted on the train partition only
/// and the same fitted transform is applied to both.
pub fn train(
    series: &ObservationSeries,
    config: &TrainingConfig,
) -> Result<ModelBundle, TrainingError> {
    let data = build_training_data(series, PREDICTION_HORIZON_HOURS);
    if data.is_empty() {
        return Err(TrainingError::NoUsableRows);
    }
    let n = data.len();
    if n < MIN_TRAINING_ROWS {
        return Err(ModelError::InsufficientData(n).into());
    }
    info!(rows = n, "engineered training data");

    let x = Array2::from_shape_vec(
        (n, NUM_FEATURES),
        data.features.into_iter().flatten().collect(),
    )
    .map_err(|e| ModelError::Fit(e.to_string()))?;
    let y_temperature = Array1::from_vec(data.temperature_targets);
    let y_humidity = Array1::from_vec(data.humidity_targets);

    // Seeded shuffle, then a fixed-fraction hold-out from the tail.
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);

    let n_holdout = ((n as f64) * config.holdout_fraction).round() as usize;
    let n_holdout = n_holdout.clamp(1, n - 1);
    let (train_idx, holdout_idx) = indices.split_at(n - n_holdout);

    let x_train = x.select(Axis(0), train_idx);
    let x_holdout = x.select(Axis(0), holdout_idx);

    // The scaler sees the train partition only; hold-out statistics must not
    // leak into the fit.
    let scaler = StandardScaler::fit(&x_train);
    let x_train = scaler.transform(&x_train);
    let x_holdout = scaler.transform(&x_holdout);

    let mut fit_target = |y: &Array1<f64>| -> Result<(LinearModel, TargetMetrics), TrainingError> {
        let y_train = y.select(Axis(0), train_idx);
        let y_holdout = y.select(Axis(0), holdout_idx);

        let model = fit_regressor(&x_train, &y_train, config.penalty, config.l1_ratio)?;
        let predictions = model.predict(&x_holdout);
        let mae = require_finite("mae", mean_absolute_error(&predictions, &y_holdout))?;
        let r2 = require_finite("r2", r_squared(&predictions, &y_holdout))?;
        let cv_mae = cross_validated_mae(&x_train, &y_train, config)?;

        Ok((model, TargetMetrics { mae, r2, cv_mae }))
    };

    let (temperature_model, temperature_metrics) = fit_target(&y_temperature)?;
    let (humidity_model, humidity_metrics) = fit_target(&y_humidity)?;

    info!(
        mae = temperature_metrics.mae,
        r2 = temperature_metrics.r2,
        cv_mae = ?temperature_metrics.cv_mae,
        "temperature hold-out evaluation (degC)"
    );
    info!(
        mae = humidity_metrics.mae,
        r2 = humidity_metrics.r2,
        cv_mae = ?humidity_metrics.cv_mae,
        "humidity hold-out evaluation (%)"
    );

    Ok(ModelBundle {
        scaler,
        temperature_model,
        humidity_model,
        metadata: ModelMetadata {
            version: ModelMetadata::CURRENT_VERSION,
            feature_columns: feature_names(),
            metrics: ModelMetrics {
                temperature: temperature_metrics,
                humidity: humidity_metrics,
            },
            training_date: Utc::now(),
            model_type: MODEL_FAMILY.to_string(),
            prediction_horizon: HORIZON_LABEL.to_string(),
            training_samples: n,
        },
    })
}

/// K-fold cross-validated MAE on the (already normalized) train partition.
///
/// A stability signal only; returns `None` when the partition is too small
/// to fold.
fn cross_validated_mae(
    x: &Array2<f64>,
    y: &Array1<f64>,
    config: &TrainingConfig,
) -> Result<Option<f64>, TrainingError> {
    let n = x.nrows();
    let k = config.cv_folds.min(n);
    if k < 2 {
        return Ok(None);
    }

    let fold_size = n.div_ceil(k);
    let mut fold_maes = Vec::with_capacity(k);

    for fold in 0..k {
        let start = fold * fold_size;
        let end = ((fold + 1) * fold_size).min(n);
        if start >= end {
            continue;
        }

        let valid_idx: Vec<usize> = (start..end).collect();
        let train_idx: Vec<usize> = (0..n).filter(|i| *i < start || *i >= end).collect();
        if train_idx.is_empty() {
            continue;
        }

        let model = fit_regressor(
            &x.select(Axis(0), &train_idx),
            &y.select(Axis(0), &train_idx),
            config.penalty,
            config.l1_ratio,
        )?;
        let predictions = model.predict(&x.select(Axis(0), &valid_idx));
        fold_maes.push(mean_absolute_error(
            &predictions,
            &y.select(Axis(0), &valid_idx),
        ));
    }

    if fold_maes.is_empty() {
        return Ok(None);
    }
    let mean = fold_maes.iter().sum::<f64>() / fold_maes.len() as f64;
    Ok(Some(require_finite("cv_mae", mean)?))
}
