use aq_forecast::error::PipelineError;
use aq_forecast::pipelines::{self, PipelineContext};
use aq_forecast::settings::{CityConfig, FeatureViewRef, ModelRef, RetrySettings, Sensor, Settings};
use aq_forecast::sources::{Backoff, ScriptedTransport, TransportError, TransportErrorKind};
use aq_forecast::store::MemoryBackend;
use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn day(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, d).unwrap()
}

fn settings(root: &Path) -> Settings {
    let mut settings = Settings {
        store_root: root.join("store"),
        artifacts_dir: root.join("artifacts"),
        data_dir: root.join("data"),
        model_root: root.join("models"),
        backfill_days: 29,
        retry: RetrySettings {
            max_attempts: 3,
            delay_secs: 0,
            backoff: Backoff::Fixed,
        },
        ..Settings::default()
    };
    settings.training.n_estimators = 20;
    settings
}

fn city() -> CityConfig {
    CityConfig {
        city_name: "Gothenburg".to_string(),
        country_name: "Sweden".to_string(),
        street_name: "Femman".to_string(),
        city_lat: 57.7089,
        city_lon: 11.9746,
        sensors: vec![Sensor::new("femman"), Sensor::new("haga")],
        fg_versions: BTreeMap::new(),
        feature_view: FeatureViewRef::default(),
        model_registry: ModelRef::default(),
        forecast_days: 3,
    }
}

fn dates(start: NaiveDate, days: i64) -> Vec<NaiveDate> {
    (0..days).map(|i| start + Duration::days(i)).collect()
}

fn weather_body(days: &[NaiveDate]) -> Value {
    let n = days.len();
    json!({
        "latitude": 57.7,
        "longitude": 11.97,
        "daily": {
            "time": days.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
            "temperature_2m_max": (0..n).map(|i| 2.0 + (i % 5) as f64).collect::<Vec<_>>(),
            "wind_speed_10m_max": (0..n).map(|i| 10.0 + (i % 3) as f64).collect::<Vec<_>>(),
            "wind_gusts_10m_max": (0..n).map(|i| 18.0 + (i % 4) as f64).collect::<Vec<_>>(),
            "wind_direction_10m_dominant": (0..n).map(|i| (i * 37 % 360) as f64).collect::<Vec<_>>()
        }
    })
}

fn pm25_body(days: &[NaiveDate]) -> Value {
    json!({
        "daily": {
            "time": days.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
            "pm2_5_mean": (0..days.len()).map(|i| 6.0 + i as f64).collect::<Vec<_>>()
        }
    })
}

fn write_observed_csv(data_dir: &Path, sensor: &str, days: &[NaiveDate]) {
    fs::create_dir_all(data_dir).unwrap();
    let mut csv = String::from("date, pm25\n");
    for (i, d) in days.iter().enumerate() {
        csv.push_str(&format!("{}, {}\n", d, 8.0 + (i % 7) as f64));
    }
    fs::write(data_dir.join(format!("{}.csv", sensor)), csv).unwrap();
}

fn context(root: &Path, transport: Arc<ScriptedTransport>) -> PipelineContext<MemoryBackend> {
    PipelineContext::new(settings(root), city(), MemoryBackend::new(), transport).with_quiet(true)
}

#[tokio::test]
async fn test_full_cycle_backfill_train_daily_predict_hindcast_forecast() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(ScriptedTransport::new());
    let ctx = context(dir.path(), transport.clone());

    // Only femman has an observed export; haga must not abort the run
    let history = dates(day(1, 1), 30);
    write_observed_csv(&ctx.settings.data_dir, "femman", &history);

    transport.push_json(weather_body(&history));
    let backfill = pipelines::backfill(&ctx, day(1, 30)).await.unwrap();
    assert_eq!(backfill.weather.inserted, 60);
    assert_eq!(backfill.air_quality.inserted, 30);

    let requests = transport.requests();
    let (url, query) = &requests[0];
    assert!(url.contains("archive"));
    assert!(query.contains(&("start_date".to_string(), "2024-01-01".to_string())));
    assert!(query.contains(&("end_date".to_string(), "2024-01-30".to_string())));

    // Labels up to 01-23 survive the 7-day cutoff; lags are complete from 01-04
    let card = pipelines::train(&ctx, Some(2)).unwrap();
    assert_eq!(card.version, 1);
    assert_eq!(card.metrics.n_train, 16);
    assert_eq!(card.metrics.n_test, 4);
    assert!(card.metrics.mae.is_finite());

    let horizon = dates(day(1, 30), 4);
    transport.push_json(weather_body(&horizon));
    transport.push_json(pm25_body(&horizon));
    let daily = pipelines::daily(&ctx, day(1, 31), false).await.unwrap();
    assert_eq!(daily.weather.updated, 2);
    assert_eq!(daily.weather.inserted, 6);
    assert_eq!(daily.shadowed_forecasts, 1);
    assert_eq!(daily.air_quality.inserted, 7);

    let observed = ctx.air_quality().unwrap().read_all().unwrap();
    let femman_jan30 = observed
        .iter()
        .find(|r| r.location.sensor_id == "femman" && r.date == day(1, 30))
        .unwrap();
    assert!(femman_jan30.is_observed());

    let earlier = pipelines::predict(&ctx, day(1, 25), None).unwrap();
    assert_eq!(earlier.rows, 28);
    assert_eq!(earlier.model_version, 1);

    let summary = pipelines::predict(&ctx, day(1, 31), None).unwrap();
    assert_eq!(summary.rows, 28);
    assert_eq!(summary.forecast_rows, 4);
    assert_eq!(summary.output, ctx.settings.predictions_path());
    let artifact = fs::read_to_string(&summary.output).unwrap();
    assert!(artifact.starts_with("date,city_name,sensor_id,pm2_5_pred,pm2_5,days_before_forecast_day"));

    // Two issues for the same dates are kept apart by days_before_forecast_day
    assert_eq!(ctx.predictions().unwrap().read_all().unwrap().len(), 56);

    let (report, hindcast_path) = pipelines::hindcast_report(&ctx, day(1, 31)).unwrap();
    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].date, day(1, 26));
    assert_eq!(report.rows[0].sensor_id, "femman");
    assert_eq!(report.mae_by_sensor.len(), 1);
    assert!(hindcast_path.exists());

    let (forecast, forecast_path) = pipelines::forecast(&ctx, day(2, 1), Some(2)).unwrap();
    let labelled: Vec<(String, NaiveDate)> = forecast
        .iter()
        .map(|r| (r.sensor_id.clone(), r.date))
        .collect();
    assert_eq!(
        labelled,
        vec![
            ("femman".to_string(), day(2, 2)),
            ("femman".to_string(), day(2, 3)),
            ("haga".to_string(), day(2, 2)),
            ("haga".to_string(), day(2, 3)),
        ]
    );
    assert!(forecast_path.exists());

    let datasets = pipelines::inspect(&ctx).unwrap();
    let names: Vec<String> = datasets.iter().map(|d| d.id.name.clone()).collect();
    assert_eq!(names, vec!["air_quality", "aq_predictions", "weather"]);
    assert!(datasets.iter().all(|d| d.in_use));
}

/// Log sink for asserting on warnings.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .finish(),
        )
    }

    fn output(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_backfill_without_any_csv_leaves_air_quality_empty() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(ScriptedTransport::new());
    let ctx = context(dir.path(), transport.clone());
    let logs = CapturedLogs::default();

    transport.push_json(weather_body(&dates(day(1, 1), 30)));
    let summary = {
        let _guard = logs.install();
        pipelines::backfill(&ctx, day(1, 30)).await.unwrap()
    };

    let output = logs.output();
    assert!(output.contains("Observed pm2_5 CSV not found"));
    assert!(output.contains("No observed pm2_5 found; hindcasts will be empty"));
    assert!(output.contains("city=Gothenburg"));
    assert_eq!(summary.air_quality.inserted, 0);
    assert!(ctx.air_quality().unwrap().read_all().unwrap().is_empty());

    // Weather alone cannot train a model
    assert!(matches!(
        pipelines::train(&ctx, None),
        Err(PipelineError::MissingData(_))
    ));
}

#[tokio::test]
async fn test_exhausted_retries_abort_backfill() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(ScriptedTransport::new());
    let ctx = context(dir.path(), transport.clone());
    for _ in 0..3 {
        transport.push(Err(TransportError::new(TransportErrorKind::Status(503), "unavailable")));
    }

    let err = pipelines::backfill(&ctx, day(1, 30)).await.unwrap_err();
    assert!(matches!(err, PipelineError::SourceUnavailable { attempts: 3, .. }));
    assert_eq!(transport.requests().len(), 3);
}

#[test]
fn test_predict_on_empty_store_is_fatal() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path(), Arc::new(ScriptedTransport::new()));

    let err = pipelines::predict(&ctx, day(1, 10), None).unwrap_err();
    assert!(matches!(err, PipelineError::NoDataForInference(_)));
    assert!(!ctx.settings.predictions_path().exists());
}

#[test]
fn test_hindcast_without_predictions_is_fatal() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path(), Arc::new(ScriptedTransport::new()));

    assert!(pipelines::hindcast_report(&ctx, day(1, 10)).is_err());
    assert!(pipelines::forecast(&ctx, day(1, 10), None).is_err());
}
