use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{LocationKey, SensorKey};

/// Daily weather aggregate for one location.
///
/// Every measurement is optional: the upstream APIs report `null` for
/// days they could not compute, and that gap is carried through rather
/// than coerced to a sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub date: NaiveDate,
    pub location: LocationKey,
    pub temp_max: Option<f64>,
    pub wind_speed_max: Option<f64>,
    pub wind_gusts_max: Option<f64>,
    pub wind_direction_dominant: Option<f64>,
}

impl WeatherRecord {
    pub fn new(date: NaiveDate, location: LocationKey) -> Self {
        Self {
            date,
            location,
            temp_max: None,
            wind_speed_max: None,
            wind_gusts_max: None,
            wind_direction_dominant: None,
        }
    }

    pub fn with_temp_max(mut self, value: Option<f64>) -> Self {
        self.temp_max = value;
        self
    }

    pub fn with_wind_speed_max(mut self, value: Option<f64>) -> Self {
        self.wind_speed_max = value;
        self
    }

    pub fn with_wind_gusts_max(mut self, value: Option<f64>) -> Self {
        self.wind_gusts_max = value;
        self
    }

    pub fn with_wind_direction(mut self, value: Option<f64>) -> Self {
        self.wind_direction_dominant = value;
        self
    }

    /// Copy of this record attached to a specific sensor.
    pub fn for_sensor(&self, key: SensorKey) -> Self {
        Self {
            location: LocationKey::Sensor(key),
            ..self.clone()
        }
    }

    pub fn has_measurements(&self) -> bool {
        self.temp_max.is_some()
            || self.wind_speed_max.is_some()
            || self.wind_gusts_max.is_some()
            || self.wind_direction_dominant.is_some()
    }

    /// Dominant wind direction as (sin, cos) so that 359° and 1° end up close.
    pub fn wind_direction_components(&self) -> Option<(f64, f64)> {
        self.wind_direction_dominant.map(|deg| {
            let rad = deg.to_radians();
            (rad.sin(), rad.cos())
        })
    }
}
