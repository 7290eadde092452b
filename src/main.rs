use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use meteo_forecast::{
    SystemClock,
    config::AppConfig,
    ingest::{CsvCleaner, read_observations},
    ml::WeatherPredictor,
    ml::training::train,
    server::{self, AppState},
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "meteo-forecast")]
#[command(about = "Weather forecasting pipeline - cleaning, training and serving")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clean a raw semicolon-delimited weather export
    Clean {
        /// Raw CSV file
        input: PathBuf,
        /// Output path (defaults to `<input>_clean.csv`)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Override the row missingness threshold
        #[arg(long)]
        missing_threshold: Option<f64>,
        /// Override the sparse-column drop threshold
        #[arg(long)]
        column_threshold: Option<f64>,
        /// Fail on rows exceeding the missingness threshold instead of dropping them
        #[arg(long)]
        strict: bool,
    },
    /// Train the forecast models from a cleaned CSV
    Train {
        /// Cleaned CSV file
        input: PathBuf,
        /// Directory to write the model bundle to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Serve the prediction API
    Serve {
        /// Directory holding a trained model bundle
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("meteo_forecast=debug");

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    match args.command {
        Command::Clean {
            input,
            output,
            missing_threshold,
            column_threshold,
            strict,
        } => {
            let mut cleaning = config.cleaning.clone();
            if let Some(t) = missing_threshold {
                cleaning.row_missing_threshold = t;
            }
            if let Some(t) = column_threshold {
                cleaning.column_missing_threshold = t;
            }
            if strict {
                cleaning.strict = true;
            }
            let output = output.unwrap_or_else(|| default_clean_path(&input));
            run_clean(&input, &output, &cleaning)
        }
        Command::Train { input, output } => {
            let output = output.unwrap_or_else(|| config.server.model_dir.clone());
            run_train(&input, &output, &config)
        }
        Command::Serve { model_dir, port } => {
            let mut server = config.server.clone();
            if let Some(dir) = model_dir {
                server.model_dir = dir;
            }
            if let Some(port) = port {
                server.port = port;
            }
            run_serve(&server)
        }
    }
}

/// `weather.csv` cleans to `weather_clean.csv` next to the input.
fn default_clean_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "weather".to_string());
    input.with_file_name(format!("{stem}_clean.csv"))
}

fn run_clean(
    input: &Path,
    output: &Path,
    config: &meteo_forecast::config::CleaningConfig,
) -> Result<()> {
    let cleaner = CsvCleaner::new(*config);
    let stats = cleaner
        .clean_file(input, output)
        .with_context(|| format!("Failed to clean {}", input.display()))?;

    println!("{}", stats.summary());
    println!("Cleaned data written to {}", output.display());
    Ok(())
}

fn run_train(input: &Path, output: &Path, config: &AppConfig) -> Result<()> {
    let series = read_observations(input)
        .with_context(|| format!("Failed to read observations from {}", input.display()))?;
    println!("Loaded {} usable observations", series.len());

    let bundle = train(&series, &config.training).context("Training failed")?;
    println!("{}", bundle.metadata.summary());

    bundle
        .save(output)
        .with_context(|| format!("Failed to save model bundle to {}", output.display()))?;
    println!("Model bundle saved to {}", output.display());
    Ok(())
}

fn run_serve(config: &meteo_forecast::config::ServerConfig) -> Result<()> {
    let predictor = WeatherPredictor::load(&config.model_dir, Arc::new(SystemClock))
        .with_context(|| {
            format!("Failed to load model bundle from {}", config.model_dir.display())
        })?;
    println!("{}", predictor.metadata().summary());

    let state = AppState::new(Arc::new(predictor));
    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(server::serve(config, state))
}
