pub mod air_quality;
pub mod feature;
pub mod location;
pub mod prediction;
pub mod weather;

pub use air_quality::{AirQualityRecord, AirQualitySource};
pub use feature::{FeatureRow, FEATURE_COLUMNS, LAG_DAYS};
pub use location::{Coordinates, LocationKey, SensorKey};
pub use prediction::{HindcastRow, PredictionRow};
pub use weather::WeatherRecord;
