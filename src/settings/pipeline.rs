use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::normalize::MissingValuePolicy;
use crate::processors::QualityRules;
use crate::sources::{Backoff, RetryPolicy};
use crate::store::ParquetCompression;
use crate::utils::constants::*;

/// Deployment settings shared by every pipeline stage.
///
/// Layered with the `config` crate: built-in defaults, then an optional
/// settings file, then `AQF_*` environment variables (`__` separates
/// nested keys, e.g. `AQF_RETRY__MAX_ATTEMPTS=5`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store_root: PathBuf,
    pub artifacts_dir: PathBuf,
    pub data_dir: PathBuf,
    pub model_root: PathBuf,
    /// IANA timezone name used for "today" and sent to the weather APIs.
    pub timezone: String,
    pub backfill_days: u32,
    pub storage: StorageSettings,
    pub http: HttpSettings,
    pub retry: RetrySettings,
    pub quality: QualitySettings,
    pub missing_values: MissingValuePolicy,
    pub training: TrainingSettings,
    pub inference: InferenceSettings,
}

/// Parquet layout of the feature store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub compression: ParquetCompression,
    pub row_group_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub weather_forecast_url: String,
    pub weather_archive_url: String,
    pub air_quality_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay_secs: u64,
    pub backoff: Backoff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    /// `true` accepts pm2_5 == 500, `false` rejects it.
    pub pm25_max_inclusive: bool,
    pub max_rejected_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub test_fraction: f64,
    pub label_cutoff_days: i64,
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub window: usize,
    pub lookback_days: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from(DEFAULT_STORE_ROOT),
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            model_root: PathBuf::from(DEFAULT_MODEL_ROOT),
            timezone: "UTC".to_string(),
            backfill_days: DEFAULT_BACKFILL_DAYS,
            storage: StorageSettings::default(),
            http: HttpSettings::default(),
            retry: RetrySettings::default(),
            quality: QualitySettings::default(),
            missing_values: MissingValuePolicy::Drop,
            training: TrainingSettings::default(),
            inference: InferenceSettings::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            compression: ParquetCompression::Snappy,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            weather_forecast_url: OPEN_METEO_FORECAST_URL.to_string(),
            weather_archive_url: OPEN_METEO_ARCHIVE_URL.to_string(),
            air_quality_url: OPEN_METEO_AIR_QUALITY_URL.to_string(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_secs: DEFAULT_RETRY_DELAY_SECS,
            backoff: Backoff::Fixed,
        }
    }
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            pm25_max_inclusive: true,
            max_rejected_fraction: DEFAULT_MAX_REJECTED_FRACTION,
        }
    }
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            test_fraction: DEFAULT_TEST_FRACTION,
            label_cutoff_days: DEFAULT_LABEL_CUTOFF_DAYS,
            n_estimators: 450,
            max_depth: 6,
            learning_rate: 0.08,
            min_samples_leaf: 2,
        }
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_INFERENCE_WINDOW,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

impl Settings {
    /// Build settings from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Settings::default())?);

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.check()?;
        Ok(settings)
    }

    pub fn check(&self) -> Result<()> {
        self.tz()?;

        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.training.test_fraction) {
            return Err(PipelineError::Config(format!(
                "training.test_fraction must be in [0, 1), got {}",
                self.training.test_fraction
            )));
        }
        if !(0.0..=1.0).contains(&self.quality.max_rejected_fraction) {
            return Err(PipelineError::Config(format!(
                "quality.max_rejected_fraction must be in [0, 1], got {}",
                self.quality.max_rejected_fraction
            )));
        }
        if self.storage.row_group_size == 0 {
            return Err(PipelineError::Config(
                "storage.row_group_size must be at least 1".to_string(),
            ));
        }
        if self.inference.window == 0 {
            return Err(PipelineError::Config(
                "inference.window must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|e| {
            PipelineError::Config(format!("Invalid timezone '{}': {}", self.timezone, e))
        })
    }

    /// Calendar date "now" in the deployment timezone.
    pub fn today(&self) -> Result<NaiveDate> {
        Ok(Utc::now().with_timezone(&self.tz()?).date_naive())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_secs(self.retry.delay_secs),
        )
        .with_backoff(self.retry.backoff)
    }

    pub fn quality_rules(&self) -> QualityRules {
        QualityRules::default()
            .with_pm25_max_inclusive(self.quality.pm25_max_inclusive)
            .with_max_rejected_fraction(self.quality.max_rejected_fraction)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn predictions_path(&self) -> PathBuf {
        self.artifacts_dir.join(PREDICTIONS_FILE)
    }
}
