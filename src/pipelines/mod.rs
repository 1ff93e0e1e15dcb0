//! End-to-end stages run by the CLI. Each stage takes an explicit
//! [`PipelineContext`]; nothing is looked up globally.

pub mod feature;
pub mod inference;
pub mod inspect;
pub mod training;

use std::sync::Arc;

use crate::error::Result;
use crate::models::{AirQualityRecord, PredictionRow, WeatherRecord};
use crate::regression::ModelRegistry;
use crate::settings::{CityConfig, Settings};
use crate::sources::{JsonTransport, ObservedCsvReader, OpenMeteoClient, ReqwestTransport};
use crate::store::{FeatureGroup, FeatureStore, FeatureView, ParquetBackend, StoreBackend, StoredRecord};
use crate::utils::constants::{AIR_QUALITY_DATASET, PREDICTIONS_DATASET, WEATHER_DATASET};

pub use feature::{backfill, daily, FeatureSummary};
pub use inference::{forecast, hindcast_report, predict, PredictSummary};
pub use inspect::{inspect, DatasetSummary};
pub use training::train;

/// Everything a stage needs for one city.
pub struct PipelineContext<B: StoreBackend> {
    pub settings: Settings,
    pub city: CityConfig,
    pub store: FeatureStore<B>,
    pub client: OpenMeteoClient,
    pub registry: ModelRegistry,
    pub quiet: bool,
}

impl PipelineContext<ParquetBackend> {
    /// Context backed by the on-disk store and the live HTTP APIs.
    pub fn open(settings: Settings, city: CityConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(settings.http_timeout())?);
        let backend = ParquetBackend::new(&settings.store_root)
            .with_compression(settings.storage.compression)
            .with_row_group_size(settings.storage.row_group_size);
        Ok(Self::new(settings, city, backend, transport))
    }
}

impl<B: StoreBackend> PipelineContext<B> {
    pub fn new(settings: Settings, city: CityConfig, backend: B, transport: Arc<dyn JsonTransport>) -> Self {
        let store = FeatureStore::new(backend).with_quality_rules(settings.quality_rules());
        let client = OpenMeteoClient::from_settings(transport, &settings);
        let registry = ModelRegistry::new(&settings.model_root);

        Self {
            settings,
            city,
            store,
            client,
            registry,
            quiet: false,
        }
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn weather(&self) -> Result<FeatureGroup<'_, WeatherRecord, B>> {
        self.store.get_or_create_dataset(WeatherRecord::spec(
            self.city.dataset_version(WEATHER_DATASET),
            &format!("Daily weather for {}, replicated per sensor", self.city.city_name),
        ))
    }

    pub fn air_quality(&self) -> Result<FeatureGroup<'_, AirQualityRecord, B>> {
        self.store.get_or_create_dataset(AirQualityRecord::spec(
            self.city.dataset_version(AIR_QUALITY_DATASET),
            &format!("Daily pm2_5 per sensor for {}", self.city.city_name),
        ))
    }

    pub fn predictions(&self) -> Result<FeatureGroup<'_, PredictionRow, B>> {
        self.store.get_or_create_dataset(PredictionRow::spec(
            self.city.dataset_version(PREDICTIONS_DATASET),
            &format!("Batch pm2_5 predictions for {}", self.city.city_name),
        ))
    }

    pub fn feature_view(&self) -> FeatureView<'_, B> {
        FeatureView::for_city(&self.store, &self.city)
    }

    /// Observed pm2_5 from every configured sensor's CSV export.
    pub fn observed_air_quality(&self) -> Result<Vec<AirQualityRecord>> {
        let reader = ObservedCsvReader::new(self.settings.missing_values);
        let mut records = Vec::new();
        for sensor in &self.city.sensors {
            let path = sensor.csv_path(&self.settings.data_dir);
            records.extend(reader.read(&path, &sensor.key(&self.city))?);
        }
        Ok(records)
    }
}
