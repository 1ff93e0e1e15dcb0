use aq_forecast::models::{AirQualityRecord, LocationKey, PredictionRow, SensorKey, WeatherRecord};
use aq_forecast::normalize::MissingValuePolicy;
use aq_forecast::processors::{relabel_forecast, JoinMode, QualityRules, TestSplit, TrainingSet};
use aq_forecast::settings::CityConfig;
use aq_forecast::sources::load_observed_air_quality;
use aq_forecast::store::{FeatureStore, FeatureView, ParquetBackend, RowFilter, StoredRecord};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::{Builder, TempDir};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn city_document(sensors: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{
            "city_name": "Gothenburg",
            "country_name": "Sweden",
            "street_name": "Femman",
            "city_lat": 57.7089,
            "city_lon": 11.9746,
            "sensors": {},
            "fg_versions": {{"weather": 1, "air_quality": 1}},
            "feature_view": {{"name": "air_quality_fv", "version": 1}},
            "model_registry": {{"name": "air_quality_model", "version": 1}}
        }}"#,
        sensors
    )
    .unwrap();
    file
}

fn site_weather(d: u32, temp: f64) -> WeatherRecord {
    WeatherRecord::new(day(d), LocationKey::site("Gothenburg", "Femman")).with_temp_max(Some(temp))
}

#[test]
fn test_two_day_scenario_through_parquet_store() {
    let dir = TempDir::new().unwrap();
    let city_file = city_document(r#"[{"id": "femman"}]"#);
    let city = CityConfig::load(city_file.path()).unwrap();
    let store = FeatureStore::new(ParquetBackend::new(dir.path()));
    let femman = SensorKey::new("Gothenburg", "femman");

    store
        .get_or_create_dataset::<WeatherRecord>(WeatherRecord::spec(1, "weather"))
        .unwrap()
        .insert(vec![site_weather(1, 5.0), site_weather(2, 6.0)])
        .unwrap();
    store
        .get_or_create_dataset::<AirQualityRecord>(AirQualityRecord::spec(1, "pm2_5"))
        .unwrap()
        .insert(vec![
            AirQualityRecord::observed(day(1), femman.clone(), 10.0),
            AirQualityRecord::observed(day(2), femman.clone(), 15.0),
        ])
        .unwrap();

    let view = FeatureView::for_city(&store, &city);
    let inference = view.get_batch_data(JoinMode::Left, None).unwrap();
    assert_eq!(inference.len(), 2);
    assert_eq!(inference[0].date, day(1));
    assert_eq!(inference[0].temp_max, Some(5.0));
    assert_eq!(inference[1].pm2_5_lag1, Some(10.0));
    assert_eq!(inference[1].temp_max, Some(6.0));

    let training = TrainingSet::split(
        view.get_batch_data(JoinMode::Inner, None).unwrap(),
        TestSplit::Fraction(0.0),
    );
    // Day 1 has no lags and never reaches the training set
    assert!(training.train.iter().all(|r| r.date != day(1)));
}

#[test]
fn test_partitions_never_share_lags() {
    let dir = TempDir::new().unwrap();
    let city_file = city_document(r#"[{"id": "femman"}, {"id": "haga"}]"#);
    let city = CityConfig::load(city_file.path()).unwrap();
    let store = FeatureStore::new(ParquetBackend::new(dir.path()));
    let femman = SensorKey::new("Gothenburg", "femman");
    let haga = SensorKey::new("Gothenburg", "haga");

    store
        .get_or_create_dataset::<WeatherRecord>(WeatherRecord::spec(1, ""))
        .unwrap()
        .insert((1..=3).map(|d| site_weather(d, 4.0)).collect())
        .unwrap();
    store
        .get_or_create_dataset::<AirQualityRecord>(AirQualityRecord::spec(1, ""))
        .unwrap()
        .insert(vec![
            AirQualityRecord::observed(day(1), femman.clone(), 10.0),
            AirQualityRecord::observed(day(2), femman.clone(), 11.0),
            AirQualityRecord::observed(day(1), haga.clone(), 40.0),
            AirQualityRecord::observed(day(2), haga.clone(), 41.0),
        ])
        .unwrap();

    let rows = FeatureView::for_city(&store, &city)
        .get_batch_data(JoinMode::Left, Some(day(3)))
        .unwrap();
    let lags: Vec<(String, Option<f64>, Option<f64>)> = rows
        .iter()
        .map(|r| (r.location.sensor_id.clone(), r.pm2_5_lag1, r.pm2_5_lag2))
        .collect();

    assert_eq!(
        lags,
        vec![
            ("femman".to_string(), Some(11.0), Some(10.0)),
            ("haga".to_string(), Some(41.0), Some(40.0)),
        ]
    );
}

#[test]
fn test_upsert_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let key = SensorKey::new("Gothenburg", "femman");

    {
        let store = FeatureStore::new(ParquetBackend::new(dir.path()));
        let mut group = store
            .get_or_create_dataset::<AirQualityRecord>(AirQualityRecord::spec(1, ""))
            .unwrap();
        group.insert(vec![AirQualityRecord::forecast(day(5), key.clone(), 20.0)]).unwrap();
        group.insert(vec![AirQualityRecord::observed(day(5), key.clone(), 22.5)]).unwrap();
    }

    let store = FeatureStore::new(ParquetBackend::new(dir.path()));
    let group = store.get_dataset::<AirQualityRecord>("air_quality", 1).unwrap();
    let rows = group.read(&RowFilter::all().for_sensor(key.clone())).unwrap();

    assert_eq!(rows, vec![AirQualityRecord::observed(day(5), key, 22.5)]);
    assert_eq!(group.meta().row_count, 1);
    assert_eq!(group.meta().min_date, Some(day(5)));
}

#[test]
fn test_exclusive_pm25_bound_applies_on_insert() {
    let dir = TempDir::new().unwrap();
    let key = SensorKey::new("Gothenburg", "femman");
    let store = FeatureStore::new(ParquetBackend::new(dir.path()))
        .with_quality_rules(QualityRules::default().with_pm25_max_inclusive(false));

    let report = store
        .get_or_create_dataset::<AirQualityRecord>(AirQualityRecord::spec(1, ""))
        .unwrap()
        .insert(vec![
            AirQualityRecord::observed(day(1), key.clone(), 0.0),
            AirQualityRecord::observed(day(2), key.clone(), 500.0),
            AirQualityRecord::observed(day(3), key, 499.0),
        ])
        .unwrap();

    assert_eq!(report.inserted, 2);
    assert_eq!(report.rejected, 1);
}

#[test]
fn test_forecast_relabeling() {
    let key = SensorKey::new("Gothenburg", "femman");
    let run_date = day(10);
    let batch: Vec<PredictionRow> = [1, 2, 3]
        .into_iter()
        .map(|d| PredictionRow::new(&key, run_date, 12.0, None, d))
        .collect();

    let dates: Vec<NaiveDate> = relabel_forecast(batch, run_date).iter().map(|r| r.date).collect();
    assert_eq!(dates, vec![day(11), day(12), day(13)]);
}

#[test]
fn test_missing_sensor_csv_is_empty_not_fatal() {
    let dir = TempDir::new().unwrap();
    let records = load_observed_air_quality(
        &dir.path().join("haga.csv"),
        &SensorKey::new("Gothenburg", "haga"),
        MissingValuePolicy::Drop,
    )
    .unwrap();
    assert!(records.is_empty());
}
