pub mod city;
pub mod pipeline;

pub use city::{CityConfig, FeatureViewRef, ModelRef, Sensor, WeatherSite};
pub use pipeline::{
    HttpSettings, InferenceSettings, QualitySettings, RetrySettings, Settings, StorageSettings, TrainingSettings,
};
