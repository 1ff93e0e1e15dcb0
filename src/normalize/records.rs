use chrono::NaiveDate;
use tracing::debug;

use crate::error::Result;
use crate::models::{AirQualityRecord, AirQualitySource, LocationKey, SensorKey, WeatherRecord};
use crate::normalize::missing::require_values;
use crate::normalize::{MissingValuePolicy, RawTable};
use crate::processors::aggregator::{aggregate_air_quality, aggregate_weather};
use crate::utils::constants::{
    AIR_QUALITY_DATASET, DATE_ALIASES, PM25_ALIASES, WEATHER_DATASET, WEATHER_DAILY_FIELDS,
};

/// Turn a raw table carrying a date-like and a pollutant-like column into
/// one record per day for `location`.
///
/// Steps, in order: column normalization, alias resolution (schema
/// mismatch when either column is absent), date parsing, fail-closed value
/// parsing, the missing-value policy, and averaging of duplicate days.
pub fn air_quality_from_table(
    table: RawTable,
    location: &SensorKey,
    source: AirQualitySource,
    policy: MissingValuePolicy,
) -> Result<Vec<AirQualityRecord>> {
    air_quality_from_table_with(table, location, source, policy, &PM25_ALIASES)
}

pub fn air_quality_from_table_with(
    table: RawTable,
    location: &SensorKey,
    source: AirQualitySource,
    policy: MissingValuePolicy,
    value_aliases: &[&str],
) -> Result<Vec<AirQualityRecord>> {
    let table = table.normalize_columns();
    let date_col = table.require_column(&DATE_ALIASES)?;
    let value_col = table.require_column(value_aliases)?;

    let dates = table.dates(date_col)?;
    let values = table.numbers(value_col);
    require_values(AIR_QUALITY_DATASET, "pm2_5", &values)?;

    let missing = values.iter().filter(|v| v.is_none()).count();
    if missing > 0 {
        debug!(
            origin = table.origin(),
            missing,
            policy = ?policy,
            "Resolving missing pm2_5 values"
        );
    }

    let records = policy
        .apply(dates.into_iter().zip(values).collect())
        .into_iter()
        .map(|(date, pm2_5)| AirQualityRecord::new(date, location.clone(), pm2_5, source))
        .collect();

    Ok(aggregate_air_quality(records))
}

/// Turn an Open-Meteo `daily` weather block into one record per day.
pub fn weather_from_table(table: RawTable, location: &LocationKey) -> Result<Vec<WeatherRecord>> {
    let table = table.normalize_columns();
    let date_col = table.require_column(&DATE_ALIASES)?;
    let dates = table.dates(date_col)?;

    let mut fields: Vec<Vec<Option<f64>>> = Vec::with_capacity(WEATHER_DAILY_FIELDS.len());
    for field in WEATHER_DAILY_FIELDS {
        let column = table.require_column(&[field])?;
        fields.push(table.numbers(column));
    }
    require_values(WEATHER_DATASET, WEATHER_DAILY_FIELDS[0], &fields[0])?;

    let records = dates
        .into_iter()
        .enumerate()
        .map(|(i, date): (usize, NaiveDate)| {
            WeatherRecord::new(date, location.clone())
                .with_temp_max(fields[0][i])
                .with_wind_speed_max(fields[1][i])
                .with_wind_gusts_max(fields[2][i])
                .with_wind_direction(fields[3][i])
        })
        .collect();

    Ok(aggregate_weather(records))
}
