use arrow::array::{Array, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::models::{AirQualityRecord, AirQualitySource, LocationKey, PredictionRow, SensorKey, WeatherRecord};
use crate::processors::QualityCheck;
use crate::store::DatasetSpec;
use crate::utils::constants::{AIR_QUALITY_DATASET, PREDICTIONS_DATASET, WEATHER_DATASET};

/// `NaiveDate::num_days_from_ce` of 1970-01-01; Arrow's Date32 counts from there.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn days_to_date(days: i32) -> Result<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
        .ok_or_else(|| PipelineError::schema("store", format!("date out of range: {} days", days)))
}

/// A row type that can live in a feature-store dataset.
pub trait StoredRecord: Sized + Clone + QualityCheck + Send + Sync {
    type Key: Ord + Clone;

    const DATASET: &'static str;
    const PRIMARY_KEY: &'static [&'static str];
    const EVENT_TIME: &'static str = "date";

    fn schema() -> SchemaRef;
    fn key(&self) -> Self::Key;
    fn event_date(&self) -> NaiveDate;
    fn sensor(&self) -> Option<SensorKey>;
    fn to_batch(records: &[Self]) -> Result<RecordBatch>;
    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>>;

    fn spec(version: u32, description: &str) -> DatasetSpec {
        DatasetSpec::new(Self::DATASET, version)
            .with_primary_key(Self::PRIMARY_KEY.iter().copied())
            .with_event_time(Self::EVENT_TIME)
            .with_description(description)
    }
}

fn column<'a, A: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a A> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PipelineError::schema("store", format!("missing column '{}'", name)))?
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| PipelineError::schema("store", format!("unexpected type for column '{}'", name)))
}

fn opt_f64(array: &Float64Array, i: usize) -> Option<f64> {
    (!array.is_null(i)).then(|| array.value(i))
}

fn opt_str(array: &StringArray, i: usize) -> Option<String> {
    (!array.is_null(i)).then(|| array.value(i).to_string())
}

impl StoredRecord for WeatherRecord {
    type Key = (LocationKey, NaiveDate);

    const DATASET: &'static str = WEATHER_DATASET;
    const PRIMARY_KEY: &'static [&'static str] = &["city_name", "sensor_id", "street_name", "date"];

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("city_name", DataType::Utf8, false),
            Field::new("street_name", DataType::Utf8, true),
            Field::new("sensor_id", DataType::Utf8, true),
            Field::new("date", DataType::Date32, false),
            Field::new("temp_max", DataType::Float64, true),
            Field::new("wind_speed_max", DataType::Float64, true),
            Field::new("wind_gusts_max", DataType::Float64, true),
            Field::new("wind_direction_dominant", DataType::Float64, true),
        ]))
    }

    fn key(&self) -> Self::Key {
        (self.location.clone(), self.date)
    }

    fn event_date(&self) -> NaiveDate {
        self.date
    }

    fn sensor(&self) -> Option<SensorKey> {
        self.location.sensor_key().cloned()
    }

    fn to_batch(records: &[Self]) -> Result<RecordBatch> {
        let cities: Vec<String> = records.iter().map(|r| r.location.city_name().to_string()).collect();
        let streets: Vec<Option<String>> = records
            .iter()
            .map(|r| r.location.street_name().map(str::to_string))
            .collect();
        let sensors: Vec<Option<String>> = records
            .iter()
            .map(|r| r.location.sensor_key().map(|k| k.sensor_id.clone()))
            .collect();
        let dates: Vec<i32> = records.iter().map(|r| date_to_days(r.date)).collect();

        let batch = RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(StringArray::from(cities)),
                Arc::new(StringArray::from(streets)),
                Arc::new(StringArray::from(sensors)),
                Arc::new(Date32Array::from(dates)),
                Arc::new(Float64Array::from(records.iter().map(|r| r.temp_max).collect::<Vec<_>>())),
                Arc::new(Float64Array::from(records.iter().map(|r| r.wind_speed_max).collect::<Vec<_>>())),
                Arc::new(Float64Array::from(records.iter().map(|r| r.wind_gusts_max).collect::<Vec<_>>())),
                Arc::new(Float64Array::from(
                    records.iter().map(|r| r.wind_direction_dominant).collect::<Vec<_>>(),
                )),
            ],
        )?;
        Ok(batch)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let cities = column::<StringArray>(batch, "city_name")?;
        let streets = column::<StringArray>(batch, "street_name")?;
        let sensors = column::<StringArray>(batch, "sensor_id")?;
        let dates = column::<Date32Array>(batch, "date")?;
        let temps = column::<Float64Array>(batch, "temp_max")?;
        let speeds = column::<Float64Array>(batch, "wind_speed_max")?;
        let gusts = column::<Float64Array>(batch, "wind_gusts_max")?;
        let directions = column::<Float64Array>(batch, "wind_direction_dominant")?;

        (0..batch.num_rows())
            .map(|i| {
                let city = cities.value(i).to_string();
                let location = match opt_str(sensors, i) {
                    Some(sensor_id) => LocationKey::sensor(city, sensor_id),
                    None => LocationKey::site(city, opt_str(streets, i).unwrap_or_default()),
                };
                Ok(WeatherRecord::new(days_to_date(dates.value(i))?, location)
                    .with_temp_max(opt_f64(temps, i))
                    .with_wind_speed_max(opt_f64(speeds, i))
                    .with_wind_gusts_max(opt_f64(gusts, i))
                    .with_wind_direction(opt_f64(directions, i)))
            })
            .collect()
    }
}

impl StoredRecord for AirQualityRecord {
    type Key = (SensorKey, NaiveDate);

    const DATASET: &'static str = AIR_QUALITY_DATASET;
    const PRIMARY_KEY: &'static [&'static str] = &["city_name", "sensor_id", "date"];

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("city_name", DataType::Utf8, false),
            Field::new("sensor_id", DataType::Utf8, false),
            Field::new("date", DataType::Date32, false),
            Field::new("pm2_5", DataType::Float64, false),
            Field::new("source", DataType::Utf8, false),
        ]))
    }

    fn key(&self) -> Self::Key {
        (self.location.clone(), self.date)
    }

    fn event_date(&self) -> NaiveDate {
        self.date
    }

    fn sensor(&self) -> Option<SensorKey> {
        Some(self.location.clone())
    }

    fn to_batch(records: &[Self]) -> Result<RecordBatch> {
        let batch = RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(StringArray::from(
                    records.iter().map(|r| r.location.city_name.clone()).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    records.iter().map(|r| r.location.sensor_id.clone()).collect::<Vec<_>>(),
                )),
                Arc::new(Date32Array::from(
                    records.iter().map(|r| date_to_days(r.date)).collect::<Vec<_>>(),
                )),
                Arc::new(Float64Array::from(records.iter().map(|r| r.pm2_5).collect::<Vec<_>>())),
                Arc::new(StringArray::from(
                    records.iter().map(|r| r.source.as_str()).collect::<Vec<_>>(),
                )),
            ],
        )?;
        Ok(batch)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let cities = column::<StringArray>(batch, "city_name")?;
        let sensors = column::<StringArray>(batch, "sensor_id")?;
        let dates = column::<Date32Array>(batch, "date")?;
        let values = column::<Float64Array>(batch, "pm2_5")?;
        let sources = column::<StringArray>(batch, "source")?;

        (0..batch.num_rows())
            .map(|i| {
                Ok(AirQualityRecord::new(
                    days_to_date(dates.value(i))?,
                    SensorKey::new(cities.value(i), sensors.value(i)),
                    values.value(i),
                    AirQualitySource::parse(sources.value(i))?,
                ))
            })
            .collect()
    }
}

impl StoredRecord for PredictionRow {
    type Key = (String, String, NaiveDate, i64);

    const DATASET: &'static str = PREDICTIONS_DATASET;
    const PRIMARY_KEY: &'static [&'static str] =
        &["city_name", "sensor_id", "date", "days_before_forecast_day"];

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("city_name", DataType::Utf8, false),
            Field::new("sensor_id", DataType::Utf8, false),
            Field::new("date", DataType::Date32, false),
            Field::new("pm2_5_pred", DataType::Float64, false),
            Field::new("pm2_5", DataType::Float64, true),
            Field::new("days_before_forecast_day", DataType::Int64, false),
        ]))
    }

    fn key(&self) -> Self::Key {
        (
            self.city_name.clone(),
            self.sensor_id.clone(),
            self.date,
            self.days_before_forecast_day,
        )
    }

    fn event_date(&self) -> NaiveDate {
        self.date
    }

    fn sensor(&self) -> Option<SensorKey> {
        Some(SensorKey::new(self.city_name.clone(), self.sensor_id.clone()))
    }

    fn to_batch(records: &[Self]) -> Result<RecordBatch> {
        let batch = RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(StringArray::from(
                    records.iter().map(|r| r.city_name.clone()).collect::<Vec<_>>(),
                )),
                Arc::new(StringArray::from(
                    records.iter().map(|r| r.sensor_id.clone()).collect::<Vec<_>>(),
                )),
                Arc::new(Date32Array::from(
                    records.iter().map(|r| date_to_days(r.date)).collect::<Vec<_>>(),
                )),
                Arc::new(Float64Array::from(records.iter().map(|r| r.pm2_5_pred).collect::<Vec<_>>())),
                Arc::new(Float64Array::from(records.iter().map(|r| r.pm2_5).collect::<Vec<_>>())),
                Arc::new(Int64Array::from(
                    records.iter().map(|r| r.days_before_forecast_day).collect::<Vec<_>>(),
                )),
            ],
        )?;
        Ok(batch)
    }

    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let cities = column::<StringArray>(batch, "city_name")?;
        let sensors = column::<StringArray>(batch, "sensor_id")?;
        let dates = column::<Date32Array>(batch, "date")?;
        let predictions = column::<Float64Array>(batch, "pm2_5_pred")?;
        let observed = column::<Float64Array>(batch, "pm2_5")?;
        let offsets = column::<Int64Array>(batch, "days_before_forecast_day")?;

        (0..batch.num_rows())
            .map(|i| {
                Ok(PredictionRow::new(
                    &SensorKey::new(cities.value(i), sensors.value(i)),
                    days_to_date(dates.value(i))?,
                    predictions.value(i),
                    opt_f64(observed, i),
                    offsets.value(i),
                ))
            })
            .collect()
    }
}
