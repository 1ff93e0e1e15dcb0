use chrono::{Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::{AirQualityRecord, FeatureRow, WeatherRecord, LAG_DAYS};
use crate::processors::{FeatureAssembler, JoinMode, QualityFilter, QualityRules};
use crate::settings::{CityConfig, WeatherSite};
use crate::store::{DatasetId, DatasetMeta, DatasetSpec, InsertReport, RowFilter, StoreBackend, StoredRecord};
use crate::utils::constants::{AIR_QUALITY_DATASET, WEATHER_DATASET};

/// Versioned, primary-keyed datasets with the quality filter on every write.
pub struct FeatureStore<B: StoreBackend> {
    backend: B,
    filter: QualityFilter,
}

impl<B: StoreBackend> FeatureStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            filter: QualityFilter::default(),
        }
    }

    pub fn with_quality_rules(mut self, rules: QualityRules) -> Self {
        self.filter = QualityFilter::new(rules);
        self
    }

    /// Open a dataset, creating its metadata on first use. Re-opening with
    /// a different primary key is a configuration error.
    pub fn get_or_create_dataset<R: StoredRecord>(&self, spec: DatasetSpec) -> Result<FeatureGroup<'_, R, B>> {
        let expected: Vec<String> = R::PRIMARY_KEY.iter().map(|c| c.to_string()).collect();
        if spec.primary_key != expected {
            return Err(PipelineError::Config(format!(
                "Dataset {} declares primary key {:?}, rows are keyed by {:?}",
                spec.id, spec.primary_key, expected
            )));
        }

        let meta = match self.backend.read_meta(&spec.id)? {
            Some(existing) => {
                if existing.primary_key != spec.primary_key {
                    return Err(PipelineError::Config(format!(
                        "Dataset {} exists with primary key {:?}, requested {:?}",
                        spec.id, existing.primary_key, spec.primary_key
                    )));
                }
                existing
            }
            None => {
                let meta = DatasetMeta::from_spec(&spec);
                self.backend.write_meta(&meta)?;
                info!(dataset = %spec.id, "Created dataset");
                meta
            }
        };

        Ok(FeatureGroup {
            store: self,
            meta,
            _record: PhantomData,
        })
    }

    /// Open an existing dataset.
    pub fn get_dataset<R: StoredRecord>(&self, name: &str, version: u32) -> Result<FeatureGroup<'_, R, B>> {
        let id = DatasetId::new(name, version);
        let meta = self
            .backend
            .read_meta(&id)?
            .ok_or_else(|| PipelineError::MissingData(format!("dataset {} does not exist", id)))?;

        Ok(FeatureGroup {
            store: self,
            meta,
            _record: PhantomData,
        })
    }

    pub fn datasets(&self) -> Result<Vec<DatasetMeta>> {
        self.backend.list()
    }

    /// Rows of a dataset that may not have been created yet.
    pub fn read_dataset<R: StoredRecord>(&self, name: &str, version: u32, filter: &RowFilter) -> Result<Vec<R>> {
        if self.backend.read_meta(&DatasetId::new(name, version))?.is_none() {
            debug!(dataset = name, version, "Dataset not created yet, reading nothing");
            return Ok(Vec::new());
        }
        self.get_dataset::<R>(name, version)?.read(filter)
    }
}

/// Typed handle on one dataset version.
pub struct FeatureGroup<'s, R: StoredRecord, B: StoreBackend> {
    store: &'s FeatureStore<B>,
    meta: DatasetMeta,
    _record: PhantomData<R>,
}

impl<'s, R: StoredRecord, B: StoreBackend> FeatureGroup<'s, R, B> {
    pub fn meta(&self) -> &DatasetMeta {
        &self.meta
    }

    pub fn id(&self) -> &DatasetId {
        &self.meta.id
    }

    /// Quality-filter `rows`, then upsert by primary key. Later rows win,
    /// both over stored rows and over earlier rows in the same batch.
    pub fn insert(&mut self, rows: Vec<R>) -> Result<InsertReport> {
        let outcome = self.store.filter.apply(&self.meta.id.name, rows)?;
        let rejected = outcome.rejected.len();

        let mut merged: BTreeMap<R::Key, R> = self
            .read_all()?
            .into_iter()
            .map(|r| (r.key(), r))
            .collect();

        let (mut inserted, mut updated) = (0, 0);
        for row in outcome.accepted {
            match merged.insert(row.key(), row) {
                Some(_) => updated += 1,
                None => inserted += 1,
            }
        }

        let rows: Vec<R> = merged.into_values().collect();
        self.store.backend.write_batch(&self.meta.id, &R::to_batch(&rows)?)?;

        self.meta.row_count = rows.len();
        self.meta.min_date = rows.iter().map(R::event_date).min();
        self.meta.max_date = rows.iter().map(R::event_date).max();
        self.meta.updated_at = Utc::now();
        self.store.backend.write_meta(&self.meta)?;

        let report = InsertReport {
            inserted,
            updated,
            rejected,
        };
        info!(dataset = %self.meta.id, %report, rows = rows.len(), "Upserted rows");
        Ok(report)
    }

    /// Stored rows matching `filter`, in primary-key order.
    pub fn read(&self, filter: &RowFilter) -> Result<Vec<R>> {
        let mut rows = Vec::new();
        for batch in self.store.backend.read_batches(&self.meta.id)? {
            rows.extend(
                R::from_batch(&batch)?
                    .into_iter()
                    .filter(|r| filter.matches(r.event_date(), r.sensor().as_ref())),
            );
        }
        debug!(dataset = %self.meta.id, rows = rows.len(), "Read rows");
        Ok(rows)
    }

    pub fn read_all(&self) -> Result<Vec<R>> {
        self.read(&RowFilter::all())
    }
}

/// A saved join of the `weather` and `air_quality` datasets, materialized
/// into feature rows on demand.
pub struct FeatureView<'s, B: StoreBackend> {
    store: &'s FeatureStore<B>,
    name: String,
    version: u32,
    weather_version: u32,
    air_quality_version: u32,
    sites: Vec<WeatherSite>,
}

impl<'s, B: StoreBackend> FeatureView<'s, B> {
    pub fn for_city(store: &'s FeatureStore<B>, city: &CityConfig) -> Self {
        Self {
            store,
            name: city.feature_view.name.clone(),
            version: city.feature_view.version,
            weather_version: city.dataset_version(WEATHER_DATASET),
            air_quality_version: city.dataset_version(AIR_QUALITY_DATASET),
            sites: city.weather_sites(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Feature rows dated on or after `start` (all rows when `None`).
    /// Both datasets are read from `max_lag` days earlier, so the first
    /// returned rows still have their lag rows to shift from.
    pub fn get_batch_data(&self, mode: JoinMode, start: Option<NaiveDate>) -> Result<Vec<FeatureRow>> {
        let max_lag = LAG_DAYS.iter().copied().max().unwrap_or(0);
        let history = RowFilter {
            start: start.map(|s| s - Duration::days(max_lag)),
            ..RowFilter::default()
        };

        let weather: Vec<WeatherRecord> =
            self.store.read_dataset(WEATHER_DATASET, self.weather_version, &history)?;
        let air_quality: Vec<AirQualityRecord> =
            self.store.read_dataset(AIR_QUALITY_DATASET, self.air_quality_version, &history)?;

        let rows: Vec<FeatureRow> = FeatureAssembler::new(mode)
            .assemble(&weather, &air_quality, &self.sites)
            .into_iter()
            .filter(|r| start.map_or(true, |s| r.date >= s))
            .collect();

        info!(
            feature_view = %self.name,
            version = self.version,
            mode = ?mode,
            rows = rows.len(),
            "Materialized feature view"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LocationKey, PredictionRow, SensorKey};
    use crate::store::MemoryBackend;
    use pretty_assertions::assert_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn key() -> SensorKey {
        SensorKey::new("Gothenburg", "femman")
    }

    #[test]
    fn test_upsert_latest_wins() {
        let store = FeatureStore::new(MemoryBackend::new());
        let mut group = store
            .get_or_create_dataset::<AirQualityRecord>(AirQualityRecord::spec(1, "pm2_5"))
            .unwrap();

        let first = group.insert(vec![AirQualityRecord::observed(day(10), key(), 10.0)]).unwrap();
        assert_eq!(first, InsertReport { inserted: 1, updated: 0, rejected: 0 });

        let second = group.insert(vec![AirQualityRecord::observed(day(10), key(), 12.0)]).unwrap();
        assert_eq!(second, InsertReport { inserted: 0, updated: 1, rejected: 0 });

        let rows = group.read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pm2_5, 12.0);
        assert_eq!(group.meta().row_count, 1);
    }

    #[test]
    fn test_insert_drops_rejected_rows() {
        let store = FeatureStore::new(MemoryBackend::new());
        let mut group = store
            .get_or_create_dataset::<AirQualityRecord>(AirQualityRecord::spec(1, ""))
            .unwrap();

        let report = group
            .insert(vec![
                AirQualityRecord::observed(day(1), key(), 5.0),
                AirQualityRecord::observed(day(2), key(), 7.0),
                AirQualityRecord::observed(day(3), key(), -1.0),
            ])
            .unwrap();

        assert_eq!(report.rejected, 1);
        assert_eq!(group.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_mostly_invalid_batch_fails_and_writes_nothing() {
        let store = FeatureStore::new(MemoryBackend::new());
        let mut group = store
            .get_or_create_dataset::<AirQualityRecord>(AirQualityRecord::spec(1, ""))
            .unwrap();

        let err = group
            .insert(vec![
                AirQualityRecord::observed(day(1), key(), 900.0),
                AirQualityRecord::observed(day(2), key(), -3.0),
            ])
            .unwrap_err();
        assert!(matches!(err, PipelineError::ValidationFailed { .. }));
        assert!(group.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_primary_key_mismatch() {
        let store = FeatureStore::new(MemoryBackend::new());
        let spec = DatasetSpec::new("air_quality", 1).with_primary_key(["city_name", "date"]);
        assert!(matches!(
            store.get_or_create_dataset::<AirQualityRecord>(spec),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_get_missing_dataset() {
        let store = FeatureStore::new(MemoryBackend::new());
        assert!(store.get_dataset::<PredictionRow>("aq_predictions", 1).is_err());
        let rows: Vec<PredictionRow> = store.read_dataset("aq_predictions", 1, &RowFilter::all()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_read_filter() {
        let store = FeatureStore::new(MemoryBackend::new());
        let mut group = store
            .get_or_create_dataset::<AirQualityRecord>(AirQualityRecord::spec(1, ""))
            .unwrap();
        let other = SensorKey::new("Gothenburg", "haga");
        group
            .insert(vec![
                AirQualityRecord::observed(day(1), key(), 1.0),
                AirQualityRecord::observed(day(5), key(), 5.0),
                AirQualityRecord::observed(day(5), other.clone(), 50.0),
            ])
            .unwrap();

        let since = group.read(&RowFilter::since(day(2))).unwrap();
        assert_eq!(since.len(), 2);

        let haga = group.read(&RowFilter::all().for_sensor(other)).unwrap();
        assert_eq!(haga.len(), 1);
        assert_eq!(haga[0].pm2_5, 50.0);
    }

    #[test]
    fn test_weather_site_and_sensor_rows_are_distinct_keys() {
        let store = FeatureStore::new(MemoryBackend::new());
        let mut group = store
            .get_or_create_dataset::<WeatherRecord>(WeatherRecord::spec(1, ""))
            .unwrap();
        let report = group
            .insert(vec![
                WeatherRecord::new(day(1), LocationKey::site("Gothenburg", "Femman")).with_temp_max(Some(1.0)),
                WeatherRecord::new(day(1), LocationKey::sensor("Gothenburg", "femman")).with_temp_max(Some(2.0)),
            ])
            .unwrap();
        assert_eq!(report.inserted, 2);
    }

    fn city() -> CityConfig {
        CityConfig {
            city_name: "Gothenburg".to_string(),
            country_name: "Sweden".to_string(),
            street_name: "Femman".to_string(),
            city_lat: 57.7089,
            city_lon: 11.9746,
            sensors: vec![crate::settings::Sensor::new("femman")],
            fg_versions: BTreeMap::new(),
            feature_view: Default::default(),
            model_registry: Default::default(),
            forecast_days: 3,
        }
    }

    #[test]
    fn test_view_start_keeps_lags_of_first_rows() {
        let store = FeatureStore::new(MemoryBackend::new());
        store
            .get_or_create_dataset::<WeatherRecord>(WeatherRecord::spec(1, ""))
            .unwrap()
            .insert(
                (1..=6)
                    .map(|d| WeatherRecord::new(day(d), LocationKey::site("Gothenburg", "Femman")).with_temp_max(Some(3.0)))
                    .collect(),
            )
            .unwrap();
        store
            .get_or_create_dataset::<AirQualityRecord>(AirQualityRecord::spec(1, ""))
            .unwrap()
            .insert((1..=6).map(|d| AirQualityRecord::observed(day(d), key(), d as f64)).collect())
            .unwrap();

        let rows = FeatureView::for_city(&store, &city())
            .get_batch_data(JoinMode::Left, Some(day(4)))
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date, day(4));
        assert_eq!(rows[0].lags(), [Some(3.0), Some(2.0), Some(1.0)]);
    }
}
