use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::SensorKey;

/// One model output row. Flat so it serializes straight to the CSV artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub date: NaiveDate,
    pub city_name: String,
    pub sensor_id: String,
    pub pm2_5_pred: f64,
    /// Observed (or API-forecast) value for the same day, when known.
    pub pm2_5: Option<f64>,
    /// Days between the run date and `date`; 1 is the forecast anchor (tomorrow).
    pub days_before_forecast_day: i64,
}

impl PredictionRow {
    pub fn new(
        key: &SensorKey,
        date: NaiveDate,
        pm2_5_pred: f64,
        pm2_5: Option<f64>,
        days_before_forecast_day: i64,
    ) -> Self {
        Self {
            date,
            city_name: key.city_name.clone(),
            sensor_id: key.sensor_id.clone(),
            pm2_5_pred,
            pm2_5,
            days_before_forecast_day,
        }
    }

    pub fn key(&self) -> SensorKey {
        SensorKey::new(self.city_name.clone(), self.sensor_id.clone())
    }

    pub fn is_forecast(&self) -> bool {
        self.days_before_forecast_day >= 1
    }

    /// Run date this prediction was issued on.
    pub fn issue_date(&self) -> NaiveDate {
        self.date - chrono::Duration::days(self.days_before_forecast_day)
    }
}

/// A past 1-day-ahead prediction next to what was later observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HindcastRow {
    pub date: NaiveDate,
    pub city_name: String,
    pub sensor_id: String,
    pub pm2_5_pred: f64,
    pub pm2_5: f64,
}

impl HindcastRow {
    pub fn absolute_error(&self) -> f64 {
        (self.pm2_5_pred - self.pm2_5).abs()
    }
}
