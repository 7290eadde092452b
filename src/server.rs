//! HTTP prediction API.
//!
//! The predictor is built once before serving begins and shared immutably
//! through [`AppState`]. "Models not loaded" is a representable state so the
//! health endpoint can report it instead of the process serving garbage.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, extract::State};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::ServerConfig;
use crate::ml::confidence::{humidity_interval, round_tenth, temperature_interval};
use crate::ml::{CurrentConditions, FeatureError, HistoricalReading, WeatherPredictor};

/// Request-level failures, mapped to HTTP statuses and a
/// `{success: false, error}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("current weather payload is required")]
    MissingCurrentWeather,
    #[error("list of locations is required")]
    MissingLocations,
    #[error("models not loaded")]
    ModelsNotLoaded,
    #[error(transparent)]
    Feature(#[from] FeatureError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingCurrentWeather
            | ApiError::MissingLocations
            | ApiError::Feature(_) => StatusCode::BAD_REQUEST,
            ApiError::ModelsNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

/// Immutable state shared across request handlers.
#[derive(Clone)]
pub struct AppState {
    predictor: Option<Arc<WeatherPredictor>>,
}

impl AppState {
    pub fn new(predictor: Arc<WeatherPredictor>) -> Self {
        Self {
            predictor: Some(predictor),
        }
    }

    /// State for a service whose bundle could not be loaded; every
    /// model-backed endpoint reports failure while `/health` stays up.
    pub fn unloaded() -> Self {
        Self { predictor: None }
    }

    pub fn models_loaded(&self) -> bool {
        self.predictor.is_some()
    }

    fn predictor(&self) -> Result<&Arc<WeatherPredictor>, ApiError> {
        self.predictor.as_ref().ok_or(ApiError::ModelsNotLoaded)
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/model_info", get(model_info))
        .route("/predict", post(predict))
        .route("/batch_predict", post(batch_predict))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn serve(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("prediction API listening on {addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PredictRequest {
    current_weather: Option<CurrentConditions>,
    #[serde(default)]
    historical_data: Vec<HistoricalReading>,
}

#[derive(Debug, Deserialize)]
struct BatchPredictRequest {
    locations: Option<Vec<LocationRequest>>,
}

#[derive(Debug, Deserialize)]
struct LocationRequest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    current_weather: Option<CurrentConditions>,
    #[serde(default)]
    historical_data: Vec<HistoricalReading>,
}

fn model_info_body(predictor: &WeatherPredictor) -> Value {
    let metadata = predictor.metadata();
    json!({
        "type": metadata.model_type,
        "training_date": metadata.training_date,
        "metrics": metadata.metrics,
    })
}

/// `GET /health` - always 200, reports whether models are loaded.
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "models_loaded": state.models_loaded(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// `GET /model_info` - full metadata document, or failure when unloaded.
async fn model_info(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let predictor = state.predictor()?;
    Ok(Json(json!({
        "success": true,
        "metadata": predictor.metadata(),
        "status": "operational",
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

/// `POST /predict` - prediction for a single location.
async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<Value>, ApiError> {
    let predictor = state.predictor()?;
    let current = request
        .current_weather
        .ok_or(ApiError::MissingCurrentWeather)?;

    let forecast = predictor.predict(&current, &request.historical_data)?;

    Ok(Json(json!({
        "success": true,
        "predictions": {
            "temperature": {
                "value": round_tenth(forecast.temperature),
                "unit": "°C",
                "confidence_interval": temperature_interval(forecast.temperature),
            },
            "humidity": {
                "value": forecast.humidity.round(),
                "unit": "%",
                "confidence_interval": humidity_interval(forecast.humidity),
            },
            "horizon": predictor.metadata().prediction_horizon,
            "timestamp": Utc::now().to_rfc3339(),
        },
        "model_info": model_info_body(predictor),
    })))
}

/// `POST /batch_predict` - independent predictions for several locations.
///
/// A failure for one location is logged and skipped; the rest of the batch
/// still succeeds.
async fn batch_predict(
    State(state): State<AppState>,
    Json(request): Json<BatchPredictRequest>,
) -> Result<Json<Value>, ApiError> {
    let predictor = state.predictor()?;
    let locations = request.locations.ok_or(ApiError::MissingLocations)?;

    let mut predictions = Vec::with_capacity(locations.len());
    for location in locations {
        let current = location.current_weather.unwrap_or_default();
        let id = location.id.unwrap_or_else(|| "unknown".to_string());

        match predictor.predict(&current, &location.historical_data) {
            Ok(forecast) => predictions.push(json!({
                "location_id": id,
                "location_name": location.name.unwrap_or_else(|| "Unknown".to_string()),
                "temperature": round_tenth(forecast.temperature),
                "humidity": forecast.humidity.round(),
            })),
            Err(e) => {
                warn!(location = %id, "skipping location in batch: {e}");
            }
        }
    }

    Ok(Json(json!({
        "success": true,
        "predictions": predictions,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}
