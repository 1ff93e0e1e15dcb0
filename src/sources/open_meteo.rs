use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::{AirQualityRecord, AirQualitySource, Coordinates, LocationKey, SensorKey, WeatherRecord};
use crate::normalize::{air_quality_from_table_with, weather_from_table, MissingValuePolicy, RawTable};
use crate::settings::Settings;
use crate::sources::{JsonTransport, RetryPolicy};
use crate::utils::constants::{
    OPEN_METEO_AIR_QUALITY_URL, OPEN_METEO_ARCHIVE_URL, OPEN_METEO_FORECAST_URL, PM25_DAILY_FIELD,
    PM25_HOURLY_FIELD, WEATHER_DAILY_FIELDS,
};

/// The two mutually exclusive request modes of the weather endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    /// Explicit inclusive range, served by the historical archive.
    Range { start: NaiveDate, end: NaiveDate },
    /// Days around today, served by the forecast endpoint.
    Horizon { past_days: u32, forecast_days: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub weather_forecast: String,
    pub weather_archive: String,
    pub air_quality: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            weather_forecast: OPEN_METEO_FORECAST_URL.to_string(),
            weather_archive: OPEN_METEO_ARCHIVE_URL.to_string(),
            air_quality: OPEN_METEO_AIR_QUALITY_URL.to_string(),
        }
    }
}

/// Weather and pm2_5 forecasts from the Open-Meteo APIs.
pub struct OpenMeteoClient {
    transport: Arc<dyn JsonTransport>,
    retry: RetryPolicy,
    endpoints: Endpoints,
    timezone: String,
    missing_values: MissingValuePolicy,
}

impl OpenMeteoClient {
    pub fn new(transport: Arc<dyn JsonTransport>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            endpoints: Endpoints::default(),
            timezone: "UTC".to_string(),
            missing_values: MissingValuePolicy::Drop,
        }
    }

    pub fn from_settings(transport: Arc<dyn JsonTransport>, settings: &Settings) -> Self {
        Self::new(transport)
            .with_retry(settings.retry_policy())
            .with_endpoints(Endpoints {
                weather_forecast: settings.http.weather_forecast_url.clone(),
                weather_archive: settings.http.weather_archive_url.clone(),
                air_quality: settings.http.air_quality_url.clone(),
            })
            .with_timezone(&settings.timezone)
            .with_missing_values(settings.missing_values)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_timezone(mut self, timezone: &str) -> Self {
        self.timezone = timezone.to_string();
        self
    }

    pub fn with_missing_values(mut self, policy: MissingValuePolicy) -> Self {
        self.missing_values = policy;
        self
    }

    /// Daily weather at `coordinates`, keyed to `location`.
    pub async fn fetch_weather(
        &self,
        coordinates: Coordinates,
        location: &LocationKey,
        window: DateWindow,
    ) -> Result<Vec<WeatherRecord>> {
        let mut query = self.base_query(coordinates);
        query.push(("daily".to_string(), WEATHER_DAILY_FIELDS.join(",")));

        let url = match window {
            DateWindow::Range { start, end } => {
                if start > end {
                    return Err(PipelineError::Config(format!(
                        "Date range starts after it ends: {} > {}",
                        start, end
                    )));
                }
                query.push(("start_date".to_string(), start.to_string()));
                query.push(("end_date".to_string(), end.to_string()));
                &self.endpoints.weather_archive
            }
            DateWindow::Horizon {
                past_days,
                forecast_days,
            } => {
                query.push(("past_days".to_string(), past_days.to_string()));
                query.push(("forecast_days".to_string(), forecast_days.to_string()));
                &self.endpoints.weather_forecast
            }
        };

        let body = self.get(url, &query).await?;
        let Some(daily) = data_block(&body, "daily") else {
            debug!(%location, "Weather response has no daily block");
            return Ok(Vec::new());
        };

        let records = weather_from_table(RawTable::from_columnar_json(url.as_str(), daily)?, location)?;
        info!(%location, rows = records.len(), "Fetched weather");
        Ok(records)
    }

    /// Daily mean pm2_5 forecast for the next `forecast_days` days. Falls
    /// back to averaging the hourly series when no daily block is returned.
    pub async fn fetch_air_quality_forecast(
        &self,
        coordinates: Coordinates,
        sensor: &SensorKey,
        forecast_days: u32,
    ) -> Result<Vec<AirQualityRecord>> {
        let mut query = self.base_query(coordinates);
        query.push(("daily".to_string(), PM25_DAILY_FIELD.to_string()));
        query.push(("hourly".to_string(), PM25_HOURLY_FIELD.to_string()));
        query.push(("forecast_days".to_string(), forecast_days.to_string()));

        let url = &self.endpoints.air_quality;
        let body = self.get(url, &query).await?;

        let (block, field) = match data_block(&body, "daily")
            .filter(|daily| daily.get(PM25_DAILY_FIELD).is_some())
        {
            Some(daily) => (daily, PM25_DAILY_FIELD),
            None => match data_block(&body, "hourly") {
                Some(hourly) => {
                    debug!(%sensor, "Averaging hourly pm2_5 per day");
                    (hourly, PM25_HOURLY_FIELD)
                }
                None => {
                    debug!(%sensor, "Air-quality response has no data block");
                    return Ok(Vec::new());
                }
            },
        };

        let records = air_quality_from_table_with(
            RawTable::from_columnar_json(url.as_str(), block)?,
            sensor,
            AirQualitySource::Forecast,
            self.missing_values,
            &[field],
        )?;
        info!(%sensor, rows = records.len(), "Fetched pm2_5 forecast");
        Ok(records)
    }

    fn base_query(&self, coordinates: Coordinates) -> Vec<(String, String)> {
        vec![
            ("latitude".to_string(), coordinates.latitude.to_string()),
            ("longitude".to_string(), coordinates.longitude.to_string()),
            ("timezone".to_string(), self.timezone.clone()),
        ]
    }

    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<Value> {
        debug!(url, ?query, "GET");
        self.retry
            .run(url, || self.transport.get_json(url, query))
            .await
    }
}

/// A named columnar block with at least one timestamp, if present.
fn data_block<'a>(body: &'a Value, name: &str) -> Option<&'a Value> {
    body.get(name)
        .filter(|block| block.is_object())
        .filter(|block| {
            block
                .get("time")
                .and_then(Value::as_array)
                .map_or(false, |times| !times.is_empty())
        })
}
