//! Weather forecasting pipeline.
//!
//! Three stages share this crate: cleaning raw semicolon-delimited weather
//! exports ([`ingest`]), fitting short-horizon temperature and humidity
//! regressors ([`ml`]), and serving predictions over HTTP ([`server`]).

pub mod config;
pub mod ingest;
pub mod ml;
pub mod server;
pub mod traits;

pub use ingest::{CleaningStats, CsvCleaner, Observation, ObservationSeries, WeatherVariable};
pub use ml::{Forecast, ModelBundle, ModelMetadata, WeatherPredictor};
pub use traits::{Clock, MockClock, SystemClock};
