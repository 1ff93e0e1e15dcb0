use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;
use validator::Validate;

use crate::error::{PipelineError, Result};
use crate::models::{Coordinates, LocationKey, SensorKey};
use crate::utils::constants::{
    AIR_QUALITY_DATASET, DEFAULT_FEATURE_VIEW, DEFAULT_FORECAST_DAYS, DEFAULT_MODEL_NAME,
};

/// Per-city pipeline configuration. Loaded once per run; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CityConfig {
    #[validate(length(min = 1))]
    pub city_name: String,

    #[serde(default)]
    pub country_name: String,

    #[serde(default)]
    pub street_name: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub city_lat: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub city_lon: f64,

    #[serde(default)]
    pub sensors: Vec<Sensor>,

    #[serde(default)]
    pub fg_versions: BTreeMap<String, u32>,

    #[serde(default)]
    pub feature_view: FeatureViewRef,

    #[serde(default)]
    pub model_registry: ModelRef,

    #[serde(default = "default_forecast_days")]
    #[validate(range(min = 1, max = 16))]
    pub forecast_days: u32,
}

fn default_forecast_days() -> u32 {
    DEFAULT_FORECAST_DAYS
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Sensor {
    #[validate(length(min = 1))]
    pub id: String,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: Option<f64>,

    #[serde(default)]
    #[validate(range(min = -180.0, max = 180.0))]
    pub lon: Option<f64>,

    #[serde(default)]
    pub city: Option<String>,

    #[serde(default)]
    pub street: Option<String>,

    /// Observed PM2.5 export for this sensor. Defaults to `<data_dir>/<id>.csv`.
    #[serde(default)]
    pub filename: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureViewRef {
    pub name: String,
    pub version: u32,
}

impl Default for FeatureViewRef {
    fn default() -> Self {
        Self {
            name: DEFAULT_FEATURE_VIEW.to_string(),
            version: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub name: String,
    /// `None` means the latest registered version.
    #[serde(default)]
    pub version: Option<u32>,
}

impl Default for ModelRef {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL_NAME.to_string(),
            version: None,
        }
    }
}

/// A distinct place weather is fetched for, and the sensors that share it.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSite {
    pub location: LocationKey,
    pub coordinates: Coordinates,
    pub sensors: Vec<SensorKey>,
}

impl CityConfig {
    /// Load a city document (JSON, TOML or YAML by extension) and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let document = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()?;
        let city: CityConfig = document.try_deserialize()?;
        city.check()?;
        Ok(city)
    }

    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if self.sensors.is_empty() {
            return Err(PipelineError::Config(format!(
                "City '{}' has no sensors configured",
                self.city_name
            )));
        }

        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            sensor.validate()?;
            if !seen.insert(sensor.id.as_str()) {
                return Err(PipelineError::Config(format!(
                    "Duplicate sensor id '{}' in city '{}'",
                    sensor.id, self.city_name
                )));
            }
            if sensor.lat.is_some() != sensor.lon.is_some() {
                return Err(PipelineError::Config(format!(
                    "Sensor '{}' must set both lat and lon, or neither",
                    sensor.id
                )));
            }
        }

        Ok(())
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.city_lat, self.city_lon)
    }

    /// Version configured for a dataset; unlisted datasets are version 1.
    pub fn dataset_version(&self, name: &str) -> u32 {
        self.fg_versions.get(name).copied().unwrap_or(1)
    }

    /// Group sensors by the site their weather comes from. Sensors without
    /// their own coordinates share the city's site. Weather rows are keyed by
    /// (city, street), so one street is one site: the first sensor on a
    /// street fixes its coordinates.
    pub fn weather_sites(&self) -> Vec<WeatherSite> {
        let mut sites: Vec<WeatherSite> = Vec::new();

        for sensor in &self.sensors {
            let location = sensor.site(self);
            let coordinates = sensor.coordinates(self);
            let key = sensor.key(self);

            match sites.iter_mut().find(|site| site.location == location) {
                Some(site) => {
                    if site.coordinates != coordinates {
                        warn!(
                            sensor = %sensor.id,
                            site = %site.location,
                            "Sensor coordinates differ from its site; using the site's"
                        );
                    }
                    site.sensors.push(key);
                }
                None => sites.push(WeatherSite {
                    location,
                    coordinates,
                    sensors: vec![key],
                }),
            }
        }

        sites
    }

    pub fn air_quality_version(&self) -> u32 {
        self.dataset_version(AIR_QUALITY_DATASET)
    }
}

impl Sensor {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            lat: None,
            lon: None,
            city: None,
            street: None,
            filename: None,
        }
    }

    pub fn key(&self, city: &CityConfig) -> SensorKey {
        SensorKey::new(self.city_name(city), self.id.clone())
    }

    pub fn city_name(&self, city: &CityConfig) -> String {
        self.city.clone().unwrap_or_else(|| city.city_name.clone())
    }

    pub fn site(&self, city: &CityConfig) -> LocationKey {
        LocationKey::site(
            self.city_name(city),
            self.street.clone().unwrap_or_else(|| city.street_name.clone()),
        )
    }

    pub fn coordinates(&self, city: &CityConfig) -> Coordinates {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Coordinates::new(lat, lon),
            _ => city.coordinates(),
        }
    }

    pub fn csv_path(&self, data_dir: &Path) -> PathBuf {
        match &self.filename {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => data_dir.join(path),
            None => data_dir.join(format!("{}.csv", self.id)),
        }
    }
}
