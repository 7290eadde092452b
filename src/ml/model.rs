//! Normalizer and regression model wrappers around linfa.
//!
//! The fitted elastic net is reduced to its coefficients and intercept so the
//! whole model round-trips through the bundle files; predictions at serving
//! time are a dot product against those persisted parameters.

use linfa::prelude::*;
use linfa_elasticnet::ElasticNet;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when fitting or evaluating a model.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("insufficient data for training: {0} samples")]
    InsufficientData(usize),
    #[error("feature and target lengths mismatch: {features} vs {targets}")]
    MismatchedLengths { features: usize, targets: usize },
    #[error("model fitting error: {0}")]
    Fit(String),
    #[error("non-finite {metric} metric: {value}")]
    DegenerateMetric { metric: &'static str, value: f64 },
}

/// Zero-mean/unit-variance normalizer, fitted per feature column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    /// Fit column means and standard deviations on the given matrix.
    ///
    /// A zero-variance column keeps a unit scale so transforming it yields
    /// zeros instead of dividing by zero.
    pub fn fit(x: &Array2<f64>) -> Self {
        let means = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()))
            .to_vec();
        let stds = x
            .std_axis(Axis(0), 0.0)
            .iter()
            .map(|&s| if s > 1e-12 { s } else { 1.0 })
            .collect();
        Self { means, stds }
    }

    pub fn num_features(&self) -> usize {
        self.means.len()
    }

    /// Apply the fitted transform to a matrix.
    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x.clone();
        for (j, mut column) in out.columns_mut().into_iter().enumerate() {
            column.mapv_inplace(|v| (v - self.means[j]) / self.stds[j]);
        }
        out
    }

    /// Apply the fitted transform to a single feature vector.
    pub fn transform_row(&self, row: &[f64]) -> Array1<f64> {
        Array1::from_iter(
            row.iter()
                .zip(self.means.iter().zip(self.stds.iter()))
                .map(|(&v, (&m, &s))| (v - m) / s),
        )
    }
}

/// A fitted linear regressor: persisted coefficients plus intercept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    /// Predict a single normalized feature vector.
    pub fn predict_row(&self, row: &Array1<f64>) -> f64 {
        let weights = Array1::from_vec(self.weights.clone());
        row.dot(&weights) + self.intercept
    }

    /// Predict every row of a normalized matrix.
    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let weights = Array1::from_vec(self.weights.clone());
        x.dot(&weights) + self.intercept
    }
}

/// Fit an elastic-net regressor on normalized inputs.
pub fn fit_regressor(
    x: &Array2<f64>,
    y: &Array1<f64>,
    penalty: f64,
    l1_ratio: f64,
) -> Result<LinearModel, ModelError> {
    if x.nrows() == 0 {
        return Err(ModelError::InsufficientData(0));
    }
    if x.nrows() != y.len() {
        return Err(ModelError::MismatchedLengths {
            features: x.nrows(),
            targets: y.len(),
        });
    }

    let dataset = Dataset::new(x.clone(), y.clone());
    let model = ElasticNet::params()
        .penalty(penalty)
        .l1_ratio(l1_ratio)
        .fit(&dataset)
        .map_err(|e| ModelError::Fit(e.to_string()))?;

    Ok(LinearModel {
        weights: model.hyperplane().to_vec(),
        intercept: model.intercept(),
    })
}

/// Mean absolute error between predictions and observed targets.
pub fn mean_absolute_error(predictions: &Array1<f64>, targets: &Array1<f64>) -> f64 {
    if predictions.is_empty() || predictions.len() != targets.len() {
        return f64::NAN;
    }
    predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).abs())
        .sum::<f64>()
        / predictions.len() as f64
}

/// Coefficient of determination.
///
/// When the target has zero variance the score is 1.0 if the residuals are
/// also zero and 0.0 otherwise, so degenerate hold-out sets still produce a
/// finite, meaningful number.
pub fn r_squared(predictions: &Array1<f64>, targets: &Array1<f64>) -> f64 {
    if predictions.is_empty() || predictions.len() != targets.len() {
        return f64::NAN;
    }
    let mean = targets.sum() / targets.len() as f64;
    let ss_res: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = targets.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot < 1e-12 {
        if ss_res < 1e-12 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Reject non-finite metric values.
pub fn require_finite(metric: &'static str, value: f64) -> Result<f64, ModelError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ModelError::DegenerateMetric { metric, value })
    }
}
