use chrono::{Duration, NaiveDate};
use std::collections::HashSet;
use std::fmt;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{AirQualityRecord, SensorKey, WeatherRecord};
use crate::pipelines::PipelineContext;
use crate::processors::replicate_weather;
use crate::sources::DateWindow;
use crate::store::{InsertReport, StoreBackend};
use crate::utils::ProgressReporter;

/// What one feature run wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureSummary {
    pub weather: InsertReport,
    pub air_quality: InsertReport,
    /// Forecast pm2_5 rows dropped because an observation already exists.
    pub shadowed_forecasts: usize,
}

impl fmt::Display for FeatureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "weather: {}; air_quality: {}", self.weather, self.air_quality)?;
        if self.shadowed_forecasts > 0 {
            write!(f, " ({} forecasts kept out by observations)", self.shadowed_forecasts)?;
        }
        Ok(())
    }
}

/// Historical load: archive weather for the `backfill_days` ending at
/// `end`, plus every sensor's observed pm2_5 export.
pub async fn backfill<B: StoreBackend>(ctx: &PipelineContext<B>, end: NaiveDate) -> Result<FeatureSummary> {
    let start = end - Duration::days(i64::from(ctx.settings.backfill_days));
    info!(city = %ctx.city.city_name, %start, %end, "Starting backfill");

    let weather = fetch_site_weather(ctx, DateWindow::Range { start, end }).await?;
    let mut summary = FeatureSummary {
        weather: store_weather(ctx, weather)?,
        ..FeatureSummary::default()
    };

    let observed = ctx.observed_air_quality()?;
    if observed.is_empty() {
        warn!(
            city = %ctx.city.city_name,
            data_dir = %ctx.settings.data_dir.display(),
            "No observed pm2_5 found; hindcasts will be empty"
        );
    } else {
        summary.air_quality = ctx.air_quality()?.insert(observed)?;
    }

    info!(city = %ctx.city.city_name, %summary, "Backfill complete");
    Ok(summary)
}

/// Daily refresh: yesterday's and the forecast horizon's weather, plus the
/// pm2_5 forecast. Forecast rows never replace an observed value.
pub async fn daily<B: StoreBackend>(
    ctx: &PipelineContext<B>,
    today: NaiveDate,
    refresh_observed: bool,
) -> Result<FeatureSummary> {
    let yesterday = today - Duration::days(1);
    let window = DateWindow::Horizon {
        past_days: 1,
        forecast_days: ctx.city.forecast_days,
    };

    let weather: Vec<WeatherRecord> = fetch_site_weather(ctx, window)
        .await?
        .into_iter()
        .filter(|r| r.date >= yesterday)
        .collect();
    let weather_report = store_weather(ctx, weather)?;

    let forecasts = fetch_pm25_forecast(ctx).await?;
    let observed = if refresh_observed {
        ctx.observed_air_quality()?
    } else {
        Vec::new()
    };

    let mut air_quality = ctx.air_quality()?;
    let mut observed_keys: HashSet<(SensorKey, NaiveDate)> = air_quality
        .read_all()?
        .into_iter()
        .filter(AirQualityRecord::is_observed)
        .map(|r| (r.location, r.date))
        .collect();
    observed_keys.extend(observed.iter().map(|r| (r.location.clone(), r.date)));

    let total_forecasts = forecasts.len();
    let mut rows: Vec<AirQualityRecord> = forecasts
        .into_iter()
        .filter(|r| !observed_keys.contains(&(r.location.clone(), r.date)))
        .collect();
    let shadowed_forecasts = total_forecasts - rows.len();
    rows.extend(observed);

    let summary = FeatureSummary {
        weather: weather_report,
        air_quality: air_quality.insert(rows)?,
        shadowed_forecasts,
    };
    info!(city = %ctx.city.city_name, %today, %summary, "Daily feature run complete");
    Ok(summary)
}

async fn fetch_site_weather<B: StoreBackend>(ctx: &PipelineContext<B>, window: DateWindow) -> Result<Vec<WeatherRecord>> {
    let sites = ctx.city.weather_sites();
    let progress = ProgressReporter::new(sites.len() as u64, "Fetching weather", ctx.quiet);

    let mut weather = Vec::new();
    for site in &sites {
        progress.set_message(&format!("Fetching weather for {}", site.location));
        let fetched = ctx
            .client
            .fetch_weather(site.coordinates, &site.location, window)
            .await?;
        // Per site: two sites may share a street label but not coordinates
        weather.extend(replicate_weather(&fetched, std::slice::from_ref(site)));
        progress.increment(1);
    }
    progress.finish_with_message(&format!("Fetched {} weather rows", weather.len()));

    Ok(weather)
}

/// One forecast request per site, copied to each sensor at that site.
async fn fetch_pm25_forecast<B: StoreBackend>(ctx: &PipelineContext<B>) -> Result<Vec<AirQualityRecord>> {
    let mut records = Vec::new();
    for site in ctx.city.weather_sites() {
        let Some(first) = site.sensors.first() else {
            continue;
        };
        let fetched = ctx
            .client
            .fetch_air_quality_forecast(site.coordinates, first, ctx.city.forecast_days)
            .await?;

        for sensor in &site.sensors {
            records.extend(fetched.iter().map(|r| AirQualityRecord {
                location: sensor.clone(),
                ..r.clone()
            }));
        }
    }
    Ok(records)
}

fn store_weather<B: StoreBackend>(ctx: &PipelineContext<B>, weather: Vec<WeatherRecord>) -> Result<InsertReport> {
    if weather.is_empty() {
        warn!(city = %ctx.city.city_name, "Weather source returned no rows");
        return Ok(InsertReport::default());
    }
    ctx.weather()?.insert(weather)
}
