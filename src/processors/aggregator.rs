use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::models::{AirQualityRecord, AirQualitySource, LocationKey, SensorKey, WeatherRecord};

/// Collapse duplicate (location, date) air-quality rows to their mean.
///
/// A day with any observed reading stays observed; output is ordered by
/// location, then date.
pub fn aggregate_air_quality(records: Vec<AirQualityRecord>) -> Vec<AirQualityRecord> {
    let mut grouped: BTreeMap<(SensorKey, NaiveDate), (f64, usize, AirQualitySource)> =
        BTreeMap::new();

    for record in records {
        let entry = grouped
            .entry((record.location, record.date))
            .or_insert((0.0, 0, record.source));
        entry.0 += record.pm2_5;
        entry.1 += 1;
        if record.source == AirQualitySource::Observed {
            entry.2 = AirQualitySource::Observed;
        }
    }

    grouped
        .into_iter()
        .map(|((location, date), (sum, count, source))| {
            AirQualityRecord::new(date, location, sum / count as f64, source)
        })
        .collect()
}

#[derive(Default)]
struct WeatherAccumulator {
    temp_max: Mean,
    wind_speed_max: Mean,
    wind_gusts_max: Mean,
    direction_sin: Mean,
    direction_cos: Mean,
    /// Last direction seen; returned as-is when it is the only reading.
    direction_raw: Option<f64>,
}

#[derive(Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Collapse duplicate (location, date) weather rows field by field.
///
/// Numeric fields average over the rows that report them; wind direction
/// uses the circular mean so 350° and 10° average to 0°, not 180°.
pub fn aggregate_weather(records: Vec<WeatherRecord>) -> Vec<WeatherRecord> {
    let mut grouped: BTreeMap<(LocationKey, NaiveDate), WeatherAccumulator> = BTreeMap::new();

    for record in records {
        let (sin, cos) = record
            .wind_direction_components()
            .map(|(s, c)| (Some(s), Some(c)))
            .unwrap_or((None, None));

        let acc = grouped.entry((record.location, record.date)).or_default();
        acc.temp_max.add(record.temp_max);
        acc.wind_speed_max.add(record.wind_speed_max);
        acc.wind_gusts_max.add(record.wind_gusts_max);
        acc.direction_sin.add(sin);
        acc.direction_cos.add(cos);
        if record.wind_direction_dominant.is_some() {
            acc.direction_raw = record.wind_direction_dominant;
        }
    }

    grouped
        .into_iter()
        .map(|((location, date), acc)| {
            let direction = match (acc.direction_sin.value(), acc.direction_cos.value()) {
                _ if acc.direction_sin.count == 1 => acc.direction_raw,
                (Some(s), Some(c)) => Some(s.atan2(c).to_degrees().rem_euclid(360.0)),
                _ => None,
            };

            WeatherRecord::new(date, location)
                .with_temp_max(acc.temp_max.value())
                .with_wind_speed_max(acc.wind_speed_max.value())
                .with_wind_gusts_max(acc.wind_gusts_max.value())
                .with_wind_direction(direction)
        })
        .collect()
}
