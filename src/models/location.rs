use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Identifies one (city, sensor) time series. Lags and inference windows
/// never cross this boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorKey {
    pub city_name: String,
    pub sensor_id: String,
}

impl SensorKey {
    pub fn new(city_name: impl Into<String>, sensor_id: impl Into<String>) -> Self {
        Self {
            city_name: city_name.into(),
            sensor_id: sensor_id.into(),
        }
    }
}

impl fmt::Display for SensorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.city_name, self.sensor_id)
    }
}

/// Granularity a weather record was measured at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LocationKey {
    Site {
        city_name: String,
        street_name: String,
    },
    Sensor(SensorKey),
}

impl LocationKey {
    pub fn site(city_name: impl Into<String>, street_name: impl Into<String>) -> Self {
        LocationKey::Site {
            city_name: city_name.into(),
            street_name: street_name.into(),
        }
    }

    pub fn sensor(city_name: impl Into<String>, sensor_id: impl Into<String>) -> Self {
        LocationKey::Sensor(SensorKey::new(city_name, sensor_id))
    }

    pub fn city_name(&self) -> &str {
        match self {
            LocationKey::Site { city_name, .. } => city_name,
            LocationKey::Sensor(key) => &key.city_name,
        }
    }

    pub fn sensor_key(&self) -> Option<&SensorKey> {
        match self {
            LocationKey::Sensor(key) => Some(key),
            LocationKey::Site { .. } => None,
        }
    }

    pub fn street_name(&self) -> Option<&str> {
        match self {
            LocationKey::Site { street_name, .. } => Some(street_name),
            LocationKey::Sensor(_) => None,
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationKey::Site {
                city_name,
                street_name,
            } => write!(f, "{} ({})", city_name, street_name),
            LocationKey::Sensor(key) => key.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct Coordinates {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_key_accessors() {
        let site = LocationKey::site("Gothenburg", "Femman");
        assert_eq!(site.city_name(), "Gothenburg");
        assert_eq!(site.street_name(), Some("Femman"));
        assert!(site.sensor_key().is_none());

        let sensor = LocationKey::sensor("Gothenburg", "59593");
        assert_eq!(sensor.sensor_key(), Some(&SensorKey::new("Gothenburg", "59593")));
        assert_eq!(sensor.to_string(), "Gothenburg/59593");
    }

    #[test]
    fn test_coordinates_validation() {
        assert!(Coordinates::new(57.7, 11.97).validate().is_ok());
        assert!(Coordinates::new(91.0, 11.97).validate().is_err());
        assert!(Coordinates::new(57.7, -181.0).validate().is_err());
    }
}
