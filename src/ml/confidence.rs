//! Physical output clamping and confidence bands.
//!
//! Bands are fixed-width constants derived from typical hold-out error, not
//! from per-prediction model variance.

use serde::Serialize;

/// Physically plausible temperature range in degC.
pub const TEMPERATURE_RANGE: (f64, f64) = (-50.0, 60.0);
/// Valid relative humidity range in percent.
pub const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);

/// Half-width of the temperature confidence band, degC.
pub const TEMPERATURE_INTERVAL: f64 = 2.5;
/// Half-width of the humidity confidence band, percent.
pub const HUMIDITY_INTERVAL: f64 = 5.0;

/// Clamp a raw temperature prediction to the physical range.
pub fn clamp_temperature(value: f64) -> f64 {
    value.clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1)
}

/// Clamp a raw humidity prediction to the valid percentage range.
pub fn clamp_humidity(value: f64) -> f64 {
    value.clamp(HUMIDITY_RANGE.0, HUMIDITY_RANGE.1)
}

/// Round to one decimal place, the precision reported for temperatures.
pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// A symmetric confidence band around a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// Band around a temperature prediction, one-decimal precision.
pub fn temperature_interval(value: f64) -> ConfidenceInterval {
    ConfidenceInterval {
        lower: round_tenth(value - TEMPERATURE_INTERVAL),
        upper: round_tenth(value + TEMPERATURE_INTERVAL),
    }
}

/// Band around a humidity prediction, integer precision, clamped to the
/// valid percentage range.
pub fn humidity_interval(value: f64) -> ConfidenceInterval {
    ConfidenceInterval {
        lower: clamp_humidity(value - HUMIDITY_INTERVAL).round(),
        upper: clamp_humidity(value + HUMIDITY_INTERVAL).round(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_temperature_clamping() {
        assert_eq!(clamp_temperature(75.0), 60.0);
        assert_eq!(clamp_temperature(-60.0), -50.0);
        assert_eq!(clamp_temperature(21.4), 21.4);
    }

    #[test]
    fn test_humidity_clamping() {
        assert_eq!(clamp_humidity(120.0), 100.0);
        assert_eq!(clamp_humidity(-5.0), 0.0);
        assert_eq!(clamp_humidity(55.0), 55.0);
    }

    #[test]
    fn test_temperature_interval_width() {
        let interval = temperature_interval(20.0);
        assert_relative_eq!(interval.lower, 17.5);
        assert_relative_eq!(interval.upper, 22.5);
    }

    #[test]
    fn test_humidity_interval_clamped() {
        let high = humidity_interval(98.0);
        assert_relative_eq!(high.lower, 93.0);
        assert_relative_eq!(high.upper, 100.0);

        let low = humidity_interval(2.0);
        assert_relative_eq!(low.lower, 0.0);
        assert_relative_eq!(low.upper, 7.0);
    }

    #[test]
    fn test_round_tenth() {
        assert_relative_eq!(round_tenth(21.46), 21.5);
        assert_relative_eq!(round_tenth(-3.14), -3.1);
    }
}
