use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};

use crate::models::{AirQualityRecord, FeatureRow, LocationKey, SensorKey, WeatherRecord, LAG_DAYS};
use crate::settings::WeatherSite;

/// How weather and air quality are joined on (city, sensor, date).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Both sides required (training).
    Inner,
    /// Weather required, pm2_5 optional (inference: pm2_5 is what we predict).
    Left,
}

pub struct FeatureAssembler {
    mode: JoinMode,
}

impl FeatureAssembler {
    pub fn new(mode: JoinMode) -> Self {
        Self { mode }
    }

    pub fn training() -> Self {
        Self::new(JoinMode::Inner)
    }

    pub fn inference() -> Self {
        Self::new(JoinMode::Left)
    }

    pub fn mode(&self) -> JoinMode {
        self.mode
    }

    /// Join weather and air quality per sensor and attach lagged pm2_5.
    ///
    /// Site-level weather is replicated onto every sensor of that site.
    /// Lags shift pm2_5 by 1, 2 and 3 rows inside each joined (city, sensor)
    /// series in date order, so they never read another sensor's values
    /// and the first rows of every series have undefined lags. Output is
    /// ordered by (city, sensor, date).
    pub fn assemble(
        &self,
        weather: &[WeatherRecord],
        air_quality: &[AirQualityRecord],
        sites: &[WeatherSite],
    ) -> Vec<FeatureRow> {
        let weather_by_key: BTreeMap<(SensorKey, NaiveDate), WeatherRecord> =
            replicate_weather(weather, sites)
                .into_iter()
                .filter_map(|record| {
                    let key = record.location.sensor_key()?.clone();
                    Some(((key, record.date), record))
                })
                .collect();

        let pm25: HashMap<(SensorKey, NaiveDate), f64> = air_quality
            .iter()
            .map(|r| ((r.location.clone(), r.date), r.pm2_5))
            .collect();

        let mut rows: Vec<FeatureRow> = weather_by_key
            .into_iter()
            .filter_map(|((key, date), record)| {
                let label = pm25.get(&(key.clone(), date)).copied();
                if self.mode == JoinMode::Inner && label.is_none() {
                    return None;
                }

                let mut row = FeatureRow::new(key, date);
                row.temp_max = record.temp_max;
                row.wind_speed_max = record.wind_speed_max;
                row.wind_gusts_max = record.wind_gusts_max;
                row.wind_direction_dominant = record.wind_direction_dominant;
                row.pm2_5 = label;
                Some(row)
            })
            .collect();

        shift_lags(&mut rows);
        rows
    }
}

/// Fill `pm2_5_lag{k}` with the label `k` rows earlier in the same
/// partition. `rows` must be ordered by (sensor, date).
fn shift_lags(rows: &mut [FeatureRow]) {
    let mut start = 0;
    while start < rows.len() {
        let end = start
            + rows[start..]
                .iter()
                .take_while(|r| r.location == rows[start].location)
                .count();

        for j in start..end {
            for (i, lag) in LAG_DAYS.iter().enumerate() {
                let value = (*lag as usize <= j - start).then(|| rows[j - *lag as usize].pm2_5).flatten();
                rows[j].set_lag(i, value);
            }
        }
        start = end;
    }
}

/// Attach site-level weather to every sensor of the matching site.
///
/// Records already at sensor granularity pass through unchanged and take
/// precedence over a replicated record for the same (sensor, date).
pub fn replicate_weather(weather: &[WeatherRecord], sites: &[WeatherSite]) -> Vec<WeatherRecord> {
    let mut by_key: BTreeMap<(SensorKey, NaiveDate), (bool, WeatherRecord)> = BTreeMap::new();

    for record in weather {
        match &record.location {
            LocationKey::Sensor(key) => {
                by_key.insert((key.clone(), record.date), (true, record.clone()));
            }
            site_location @ LocationKey::Site { .. } => {
                let sensors = sites
                    .iter()
                    .filter(|site| &site.location == site_location)
                    .flat_map(|site| site.sensors.iter());

                for key in sensors {
                    let slot = (key.clone(), record.date);
                    let sensor_level = by_key.get(&slot).map(|(direct, _)| *direct);
                    if sensor_level != Some(true) {
                        by_key.insert(slot, (false, record.for_sensor(key.clone())));
                    }
                }
            }
        }
    }

    by_key.into_values().map(|(_, record)| record).collect()
}

/// How the trailing evaluation window is chosen. Never random: daily
/// observations are autocorrelated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TestSplit {
    /// Last `f` share of rows in date order.
    Fraction(f64),
    /// Rows dated after `max_date - n`.
    TrailingDays(i64),
}

#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub train: Vec<FeatureRow>,
    pub test: Vec<FeatureRow>,
}

impl TrainingSet {
    /// Drop rows with undefined lags or no label, order by date, and hold
    /// out a contiguous trailing window. A fraction split keeps at least one
    /// training row whenever any row is trainable.
    pub fn split(rows: Vec<FeatureRow>, split: TestSplit) -> Self {
        let mut rows: Vec<FeatureRow> = rows.into_iter().filter(FeatureRow::is_trainable).collect();
        rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.location.cmp(&b.location)));

        match split {
            TestSplit::Fraction(fraction) => {
                let train_len = ((1.0 - fraction.clamp(0.0, 1.0)) * rows.len() as f64).floor() as usize;
                let train_len = train_len.max(1).min(rows.len());
                let test = rows.split_off(train_len);
                Self { train: rows, test }
            }
            TestSplit::TrailingDays(days) => {
                let Some(max_date) = rows.last().map(|r| r.date) else {
                    return Self::default();
                };
                let boundary = max_date - Duration::days(days);
                let (train, test) = rows.into_iter().partition(|r| r.date <= boundary);
                Self { train, test }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.train.is_empty()
    }
}

/// Drop rows newer than `max_date - days`, where `max_date` is the most
/// recent labelled day. Recent labels are often still API forecasts.
pub fn apply_label_cutoff(rows: Vec<FeatureRow>, days: i64) -> Vec<FeatureRow> {
    let Some(max_date) = rows.iter().filter(|r| r.pm2_5.is_some()).map(|r| r.date).max() else {
        return rows;
    };
    let cutoff = max_date - Duration::days(days);
    rows.into_iter().filter(|r| r.date <= cutoff).collect()
}
