//! Raw observation ingestion and cleaning.
//!
//! Reads semicolon-delimited meteorological CSV exports, repairs what can be
//! repaired (numeric coercion, coordinate extraction) and drops what cannot
//! (missing essentials, invalid coordinates, rows with excessive
//! missingness). Every rejection is counted in [`CleaningStats`]; nothing in
//! here is fatal beyond I/O and a malformed header.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::CleaningConfig;

/// Column holding the forecast timestamp label.
pub const COL_TIMESTAMP: &str = "Forecast timestamp";
/// Column holding the "lat,lon" position string.
pub const COL_POSITION: &str = "Position";
pub const COL_TEMPERATURE: &str = "2 metre temperature";
pub const COL_HUMIDITY: &str = "2 metre relative humidity";
pub const COL_WIND_SPEED: &str = "10m wind speed";
pub const COL_PRECIPITATION: &str = "Total precipitation";
pub const COL_MIN_TEMPERATURE: &str = "Minimum temperature at 2 metres";
pub const COL_MAX_TEMPERATURE: &str = "Maximum temperature at 2 metres";

/// Columns that must be present and non-missing for a row to survive.
pub const ESSENTIAL_COLUMNS: [&str; 3] = [COL_TIMESTAMP, COL_POSITION, COL_TEMPERATURE];

/// Columns coerced to numbers during cleaning.
pub const NUMERIC_COLUMNS: [&str; 6] = [
    COL_TEMPERATURE,
    COL_MIN_TEMPERATURE,
    COL_MAX_TEMPERATURE,
    COL_HUMIDITY,
    COL_PRECIPITATION,
    COL_WIND_SPEED,
];

/// The variables tracked by the forecasting models.
///
/// The order of [`WeatherVariable::ALL`] is load-bearing: it fixes the order
/// of the per-variable feature blocks in the feature vector contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeatherVariable {
    Temperature,
    Humidity,
    WindSpeed,
    Precipitation,
}

impl WeatherVariable {
    pub const ALL: [WeatherVariable; 4] = [
        WeatherVariable::Temperature,
        WeatherVariable::Humidity,
        WeatherVariable::WindSpeed,
        WeatherVariable::Precipitation,
    ];

    /// Short name used in feature-column names and JSON payloads.
    pub fn name(&self) -> &'static str {
        match self {
            WeatherVariable::Temperature => "temperature",
            WeatherVariable::Humidity => "humidity",
            WeatherVariable::WindSpeed => "wind_speed",
            WeatherVariable::Precipitation => "precipitation",
        }
    }

    /// Header name of the corresponding CSV column.
    pub fn csv_column(&self) -> &'static str {
        match self {
            WeatherVariable::Temperature => COL_TEMPERATURE,
            WeatherVariable::Humidity => COL_HUMIDITY,
            WeatherVariable::WindSpeed => COL_WIND_SPEED,
            WeatherVariable::Precipitation => COL_PRECIPITATION,
        }
    }
}

/// One validated weather reading.
///
/// Post-validation invariant: timestamp, position and temperature are always
/// present; the remaining tracked variables parsed as finite numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: String,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub precipitation: f64,
}

impl Observation {
    /// Value of one tracked variable.
    pub fn value(&self, var: WeatherVariable) -> f64 {
        match var {
            WeatherVariable::Temperature => self.temperature,
            WeatherVariable::Humidity => self.humidity,
            WeatherVariable::WindSpeed => self.wind_speed,
            WeatherVariable::Precipitation => self.precipitation,
        }
    }
}

/// A chronologically ordered sequence of observations.
///
/// The integer offset stands in for elapsed hours; there is no explicit
/// time-gap handling. Immutable once built for a training run.
#[derive(Debug, Clone, Default)]
pub struct ObservationSeries {
    observations: Vec<Observation>,
}

impl ObservationSeries {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Observation> {
        self.observations.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    /// All values of one tracked variable, in series order.
    pub fn values(&self, var: WeatherVariable) -> Vec<f64> {
        self.observations.iter().map(|o| o.value(var)).collect()
    }
}

/// Counters describing one cleaning run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleaningStats {
    pub initial_rows: usize,
    pub cleaned_rows: usize,
    pub missing_essential: usize,
    pub conversion_errors: usize,
    pub invalid_coordinates: usize,
    pub sparse_column_drops: usize,
    pub too_many_missing: usize,
}

impl CleaningStats {
    pub fn removed_rows(&self) -> usize {
        self.initial_rows - self.cleaned_rows
    }

    pub fn removal_percent(&self) -> f64 {
        if self.initial_rows == 0 {
            0.0
        } else {
            self.removed_rows() as f64 / self.initial_rows as f64 * 100.0
        }
    }

    /// Human-readable one-run summary.
    pub fn summary(&self) -> String {
        format!(
            "{} rows in, {} rows out ({} removed, {:.2}%): {} missing essentials, \
             {} coercion failures, {} invalid coordinates, {} sparse-column drops, \
             {} over missing threshold",
            self.initial_rows,
            self.cleaned_rows,
            self.removed_rows(),
            self.removal_percent(),
            self.missing_essential,
            self.conversion_errors,
            self.invalid_coordinates,
            self.sparse_column_drops,
            self.too_many_missing,
        )
    }
}

/// Errors from reading or cleaning a raw export.
#[derive(Debug, Error)]
pub enum CleanError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("required column missing from header: {0}")]
    MissingColumn(String),
    #[error("no rows survived cleaning")]
    EmptyOutput,
}

/// Parse a "lat,lon" position string.
///
/// Returns `None` when the string is malformed or either coordinate falls
/// outside [-90, 90] x [-180, 180].
pub fn parse_coordinates(position: &str) -> Option<(f64, f64)> {
    let mut parts = position.split(',');
    let lat: f64 = parts.next()?.trim().parse().ok()?;
    let lon: f64 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) {
        Some((lat, lon))
    } else {
        None
    }
}

/// A cleaned table ready to be written back out.
#[derive(Debug, Clone)]
pub struct CleanedTable {
    /// Original header plus derived Latitude/Longitude columns.
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Row validator for raw semicolon-delimited exports.
#[derive(Debug, Clone)]
pub struct CsvCleaner {
    config: CleaningConfig,
}

impl CsvCleaner {
    pub fn new(config: CleaningConfig) -> Self {
        Self { config }
    }

    /// Clean `input` and write the surviving rows to `output`.
    pub fn clean_file(&self, input: &Path, output: &Path) -> Result<CleaningStats, CleanError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .from_path(input)?;

        let header: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut cells: Vec<String> =
                record.iter().map(|c| c.trim().to_string()).collect();
            cells.resize(header.len(), String::new());
            rows.push(cells);
        }

        let (table, stats) = self.clean_rows(&header, rows)?;
        if table.rows.is_empty() {
            return Err(CleanError::EmptyOutput);
        }

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_path(output)?;
        writer.write_record(&table.header)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
        writer.flush().map_err(csv::Error::from)?;

        Ok(stats)
    }

    /// Clean an in-memory table. Core of the validator, exercised directly by
    /// the tests.
    pub fn clean_rows(
        &self,
        header: &[String],
        rows: Vec<Vec<String>>,
    ) -> Result<(CleanedTable, CleaningStats), CleanError> {
        let col = |name: &str| header.iter().position(|h| h == name);

        let ts_idx = col(COL_TIMESTAMP)
            .ok_or_else(|| CleanError::MissingColumn(COL_TIMESTAMP.to_string()))?;
        let pos_idx = col(COL_POSITION)
            .ok_or_else(|| CleanError::MissingColumn(COL_POSITION.to_string()))?;
        let temp_idx = col(COL_TEMPERATURE)
            .ok_or_else(|| CleanError::MissingColumn(COL_TEMPERATURE.to_string()))?;

        let numeric_indices: Vec<usize> = NUMERIC_COLUMNS
            .iter()
            .filter_map(|name| col(name))
            .collect();

        let mut stats = CleaningStats {
            initial_rows: rows.len(),
            ..Default::default()
        };

        // 1. Drop rows missing an essential field, then coerce numerics and
        //    extract coordinates row by row.
        struct WorkRow {
            cells: Vec<String>,
            numeric: Vec<Option<f64>>,
            latitude: f64,
            longitude: f64,
        }

        let mut work: Vec<WorkRow> = Vec::with_capacity(rows.len());
        for mut cells in rows {
            if cells[ts_idx].is_empty() || cells[pos_idx].is_empty() || cells[temp_idx].is_empty() {
                stats.missing_essential += 1;
                continue;
            }

            // Numeric coercion: an unparsable value becomes missing, never an
            // error. Only originally-present values count as failures.
            let mut numeric = vec![None; numeric_indices.len()];
            for (slot, &idx) in numeric_indices.iter().enumerate() {
                let raw = cells[idx].as_str();
                if raw.is_empty() {
                    continue;
                }
                match raw.parse::<f64>() {
                    Ok(v) if v.is_finite() => numeric[slot] = Some(v),
                    _ => {
                        stats.conversion_errors += 1;
                        cells[idx].clear();
                    }
                }
            }

            let Some((latitude, longitude)) = parse_coordinates(&cells[pos_idx]) else {
                stats.invalid_coordinates += 1;
                continue;
            };

            work.push(WorkRow {
                cells,
                numeric,
                latitude,
                longitude,
            });
        }

        // 2. Columns whose missing rate exceeds the threshold poison the rows
        //    missing them.
        let total = work.len();
        let mut sparse_slots = Vec::new();
        if total > 0 {
            for slot in 0..numeric_indices.len() {
                let missing = work.iter().filter(|r| r.numeric[slot].is_none()).count();
                if missing as f64 / total as f64 > self.config.column_missing_threshold {
                    sparse_slots.push(slot);
                }
            }
        }
        if !sparse_slots.is_empty() {
            let before = work.len();
            work.retain(|r| sparse_slots.iter().all(|&slot| r.numeric[slot].is_some()));
            stats.sparse_column_drops = before - work.len();
        }

        // 3. Row-level missingness. Latitude/Longitude are always present so
        //    they count toward the denominator only.
        let total_fields = header.len() + 2;
        let before = work.len();
        work.retain(|r| {
            let missing = r.cells.iter().filter(|c| c.is_empty()).count();
            if self.config.strict {
                missing == 0
            } else {
                (missing as f64 / total_fields as f64) <= self.config.row_missing_threshold
            }
        });
        stats.too_many_missing = before - work.len();

        let mut out_header: Vec<String> = header.to_vec();
        out_header.push("Latitude".to_string());
        out_header.push("Longitude".to_string());

        let rows: Vec<Vec<String>> = work
            .into_iter()
            .map(|r| {
                let mut cells = r.cells;
                cells.push(format!("{}", r.latitude));
                cells.push(format!("{}", r.longitude));
                cells
            })
            .collect();

        stats.cleaned_rows = rows.len();

        Ok((CleanedTable { header: out_header, rows }, stats))
    }
}

/// Read a cleaned CSV into an [`ObservationSeries`].
///
/// Rows missing any tracked variable are skipped, matching the strict
/// feature-column filter the trainer applies.
pub fn read_observations(path: &Path) -> Result<ObservationSeries, CleanError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_path(path)?;

    let header: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let col = |name: &str| header.iter().position(|h| h == name);

    let mut var_indices = Vec::with_capacity(WeatherVariable::ALL.len());
    for var in WeatherVariable::ALL {
        let idx = col(var.csv_column())
            .ok_or_else(|| CleanError::MissingColumn(var.csv_column().to_string()))?;
        var_indices.push(idx);
    }
    let ts_idx = col(COL_TIMESTAMP);
    let lat_idx = col("Latitude");
    let lon_idx = col("Longitude");

    let mut observations = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("").trim();

        let mut values = [0.0; 4];
        let mut complete = true;
        for (i, &idx) in var_indices.iter().enumerate() {
            match record.get(idx).map(str::trim).and_then(|v| v.parse::<f64>().ok()) {
                Some(v) if v.is_finite() => values[i] = v,
                _ => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            continue;
        }

        observations.push(Observation {
            timestamp: cell(ts_idx).to_string(),
            latitude: cell(lat_idx).parse().unwrap_or(0.0),
            longitude: cell(lon_idx).parse().unwrap_or(0.0),
            temperature: values[0],
            humidity: values[1],
            wind_speed: values[2],
            precipitation: values[3],
        });
    }

    Ok(ObservationSeries::new(observations))
}
