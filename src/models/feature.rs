use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::SensorKey;

/// Lag offsets (in days) used for the pm2_5 history features.
pub const LAG_DAYS: [i64; 3] = [1, 2, 3];

/// Model input columns, in the order `FeatureRow::feature_vector` emits them.
pub const FEATURE_COLUMNS: [&str; 8] = [
    "temp_max",
    "wind_speed_max",
    "wind_gusts_max",
    "wind_direction_sin",
    "wind_direction_cos",
    "pm2_5_lag1",
    "pm2_5_lag2",
    "pm2_5_lag3",
];

/// Joined weather + air quality row for one (city, sensor, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub location: SensorKey,
    pub date: NaiveDate,
    pub temp_max: Option<f64>,
    pub wind_speed_max: Option<f64>,
    pub wind_gusts_max: Option<f64>,
    pub wind_direction_dominant: Option<f64>,
    /// Label. Absent for days that have not been observed or forecast yet.
    pub pm2_5: Option<f64>,
    pub pm2_5_lag1: Option<f64>,
    pub pm2_5_lag2: Option<f64>,
    pub pm2_5_lag3: Option<f64>,
}

impl FeatureRow {
    pub fn new(location: SensorKey, date: NaiveDate) -> Self {
        Self {
            location,
            date,
            temp_max: None,
            wind_speed_max: None,
            wind_gusts_max: None,
            wind_direction_dominant: None,
            pm2_5: None,
            pm2_5_lag1: None,
            pm2_5_lag2: None,
            pm2_5_lag3: None,
        }
    }

    pub fn lags(&self) -> [Option<f64>; 3] {
        [self.pm2_5_lag1, self.pm2_5_lag2, self.pm2_5_lag3]
    }

    pub fn set_lag(&mut self, index: usize, value: Option<f64>) {
        match index {
            0 => self.pm2_5_lag1 = value,
            1 => self.pm2_5_lag2 = value,
            2 => self.pm2_5_lag3 = value,
            _ => {}
        }
    }

    pub fn has_complete_lags(&self) -> bool {
        self.lags().iter().all(Option::is_some)
    }

    /// Row can be used for fitting: every lag defined and a label present.
    pub fn is_trainable(&self) -> bool {
        self.has_complete_lags() && self.pm2_5.is_some()
    }

    /// Numeric model input; missing values are encoded as NaN.
    pub fn feature_vector(&self) -> Vec<f64> {
        let (dir_sin, dir_cos) = self
            .wind_direction_dominant
            .map(|deg| {
                let rad = deg.to_radians();
                (Some(rad.sin()), Some(rad.cos()))
            })
            .unwrap_or((None, None));

        [
            self.temp_max,
            self.wind_speed_max,
            self.wind_gusts_max,
            dir_sin,
            dir_cos,
            self.pm2_5_lag1,
            self.pm2_5_lag2,
            self.pm2_5_lag3,
        ]
        .iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect()
    }
}
