use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PipelineError, Result};
use crate::models::SensorKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AirQualitySource {
    /// Measured by the sensor (CSV export).
    Observed,
    /// Model forecast from the air-quality API.
    Forecast,
}

impl AirQualitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AirQualitySource::Observed => "observed",
            AirQualitySource::Forecast => "forecast",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "observed" => Ok(AirQualitySource::Observed),
            "forecast" => Ok(AirQualitySource::Forecast),
            other => Err(PipelineError::schema(
                "air_quality",
                format!("unknown air quality source '{}'", other),
            )),
        }
    }
}

impl fmt::Display for AirQualitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Daily PM2.5 concentration (µg/m³) for one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQualityRecord {
    pub date: NaiveDate,
    pub location: SensorKey,
    pub pm2_5: f64,
    pub source: AirQualitySource,
}

impl AirQualityRecord {
    pub fn new(date: NaiveDate, location: SensorKey, pm2_5: f64, source: AirQualitySource) -> Self {
        Self {
            date,
            location,
            pm2_5,
            source,
        }
    }

    pub fn observed(date: NaiveDate, location: SensorKey, pm2_5: f64) -> Self {
        Self::new(date, location, pm2_5, AirQualitySource::Observed)
    }

    pub fn forecast(date: NaiveDate, location: SensorKey, pm2_5: f64) -> Self {
        Self::new(date, location, pm2_5, AirQualitySource::Forecast)
    }

    pub fn is_observed(&self) -> bool {
        self.source == AirQualitySource::Observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_round_trip() {
        assert_eq!(AirQualitySource::parse("observed").unwrap(), AirQualitySource::Observed);
        assert_eq!(AirQualitySource::parse("forecast").unwrap(), AirQualitySource::Forecast);
        assert!(AirQualitySource::parse("satellite").is_err());
        assert_eq!(AirQualitySource::Forecast.to_string(), "forecast");
    }

    #[test]
    fn test_observed_constructor() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let record = AirQualityRecord::observed(date, SensorKey::new("Gothenburg", "femman"), 12.0);
        assert!(record.is_observed());
        assert_eq!(record.pm2_5, 12.0);
    }
}
