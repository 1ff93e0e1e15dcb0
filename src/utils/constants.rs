/// Dataset names in the feature store
pub const WEATHER_DATASET: &str = "weather";
pub const AIR_QUALITY_DATASET: &str = "air_quality";
pub const PREDICTIONS_DATASET: &str = "aq_predictions";

/// Registry defaults when the city document does not name them
pub const DEFAULT_FEATURE_VIEW: &str = "air_quality_fv";
pub const DEFAULT_MODEL_NAME: &str = "air_quality_model";

/// Open-Meteo endpoints
pub const OPEN_METEO_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const OPEN_METEO_ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";
pub const OPEN_METEO_AIR_QUALITY_URL: &str = "https://air-quality-api.open-meteo.com/v1/air-quality";

/// Daily weather fields requested from Open-Meteo
pub const WEATHER_DAILY_FIELDS: [&str; 4] = [
    "temperature_2m_max",
    "wind_speed_10m_max",
    "wind_gusts_10m_max",
    "wind_direction_10m_dominant",
];
pub const PM25_DAILY_FIELD: &str = "pm2_5_mean";
pub const PM25_HOURLY_FIELD: &str = "pm2_5";

/// Column aliases accepted in observed CSV exports, in priority order
pub const DATE_ALIASES: [&str; 4] = ["date", "day", "time", "timestamp"];
pub const PM25_ALIASES: [&str; 5] = ["pm2_5", "pm25", "pm2.5", "value", "median"];

/// Physical plausibility bounds
pub const PM25_MIN: f64 = 0.0;
pub const PM25_MAX: f64 = 500.0;
pub const TEMP_MIN: f64 = -70.0;
pub const TEMP_MAX: f64 = 70.0;
pub const WIND_MIN: f64 = 0.0;
pub const WIND_MAX: f64 = 80.0;

/// Fetch defaults
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_FORECAST_DAYS: u32 = 7;
pub const DEFAULT_BACKFILL_DAYS: u32 = 400;

/// Processing defaults
pub const DEFAULT_MAX_REJECTED_FRACTION: f64 = 0.5;
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_LABEL_CUTOFF_DAYS: i64 = 7;
pub const DEFAULT_INFERENCE_WINDOW: usize = 14;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Parquet layout
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;

/// Directory and file names
pub const DEFAULT_STORE_ROOT: &str = "feature_store";
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_MODEL_ROOT: &str = "model_registry";
pub const PREDICTIONS_FILE: &str = "predictions.csv";
pub const HINDCAST_FILE: &str = "hindcast.csv";
pub const FORECAST_FILE: &str = "forecast.csv";
pub const DATASET_DATA_FILE: &str = "data.parquet";
pub const DATASET_METADATA_FILE: &str = "metadata.json";
pub const MODEL_FILE: &str = "model.json";
pub const MODEL_METRICS_FILE: &str = "metrics.json";

/// Environment variable prefix for settings overrides
pub const ENV_PREFIX: &str = "AQF";
