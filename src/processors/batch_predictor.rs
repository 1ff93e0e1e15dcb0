use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::{AirQualityRecord, FeatureRow, HindcastRow, PredictionRow, SensorKey, LAG_DAYS};
use crate::regression::Regressor;
use crate::utils::constants::DEFAULT_INFERENCE_WINDOW;

/// Applies a fitted model to the most recent rows of every (city, sensor)
/// series.
pub struct BatchPredictor<'a> {
    model: &'a dyn Regressor,
    window: usize,
}

impl<'a> BatchPredictor<'a> {
    pub fn new(model: &'a dyn Regressor) -> Self {
        Self {
            model,
            window: DEFAULT_INFERENCE_WINDOW,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    /// Predict pm2_5 for the last `window` rows of each partition.
    ///
    /// Rows are processed in date order; an undefined lag whose source row
    /// was predicted earlier in the same partition takes that prediction,
    /// so multi-day horizons chain forward. `days_before_forecast_day` is
    /// `date - run_date`: tomorrow is 1, past days are zero or negative.
    pub fn predict(&self, rows: &[FeatureRow], run_date: NaiveDate) -> Result<Vec<PredictionRow>> {
        if rows.is_empty() {
            return Err(PipelineError::NoDataForInference(format!(
                "no feature rows to predict from for run date {}",
                run_date
            )));
        }

        let mut partitions: BTreeMap<&SensorKey, Vec<&FeatureRow>> = BTreeMap::new();
        for row in rows {
            partitions.entry(&row.location).or_default().push(row);
        }

        let mut predictions = Vec::new();
        for (key, mut series) in partitions {
            series.sort_by_key(|r| r.date);
            let start = series.len().saturating_sub(self.window);

            // Predictions by position in `series`
            let mut predicted: HashMap<usize, f64> = HashMap::new();
            let mut filled = 0usize;

            for (position, row) in series.iter().enumerate().skip(start) {
                let mut row = (*row).clone();
                for (i, lag) in LAG_DAYS.iter().enumerate() {
                    if row.lags()[i].is_some() {
                        continue;
                    }
                    let source = position.checked_sub(*lag as usize);
                    if let Some(value) = source.and_then(|p| predicted.get(&p)) {
                        row.set_lag(i, Some(*value));
                        filled += 1;
                    }
                }

                let pm2_5_pred = self.model.predict(&row.feature_vector());
                predicted.insert(position, pm2_5_pred);
                predictions.push(PredictionRow::new(
                    key,
                    row.date,
                    pm2_5_pred,
                    row.pm2_5,
                    (row.date - run_date).num_days(),
                ));
            }

            debug!(
                sensor = %key,
                rows = series.len() - start,
                filled_lags = filled,
                "Predicted partition"
            );
        }

        Ok(predictions)
    }
}

/// The forecast anchor: the day after the run date.
pub fn anchor_date(run_date: NaiveDate) -> NaiveDate {
    run_date + Duration::days(1)
}

/// Re-date rows to `run_date + days_before_forecast_day`, so day 1 lands
/// on the anchor.
pub fn relabel_forecast(rows: Vec<PredictionRow>, run_date: NaiveDate) -> Vec<PredictionRow> {
    rows.into_iter()
        .map(|mut row| {
            row.date = run_date + Duration::days(row.days_before_forecast_day);
            row
        })
        .collect()
}

/// Most recent issue per sensor, restricted to `1..=horizon` days ahead and
/// re-anchored on `run_date`.
pub fn latest_forecast(
    predictions: &[PredictionRow],
    run_date: NaiveDate,
    horizon: i64,
) -> Vec<PredictionRow> {
    let ahead = |row: &&PredictionRow| (1..=horizon).contains(&row.days_before_forecast_day);

    let mut latest_issue: BTreeMap<SensorKey, NaiveDate> = BTreeMap::new();
    for row in predictions.iter().filter(ahead) {
        let issue = row.issue_date();
        if issue > run_date {
            continue;
        }
        latest_issue
            .entry(row.key())
            .and_modify(|d| *d = (*d).max(issue))
            .or_insert(issue);
    }

    let selected: Vec<PredictionRow> = predictions
        .iter()
        .filter(ahead)
        .filter(|row| latest_issue.get(&row.key()) == Some(&row.issue_date()))
        .cloned()
        .collect();

    let mut relabeled = relabel_forecast(selected, run_date);
    relabeled.sort_by(|a, b| {
        (&a.city_name, &a.sensor_id, a.date).cmp(&(&b.city_name, &b.sensor_id, b.date))
    });
    relabeled
}

#[derive(Debug, Clone, Default)]
pub struct HindcastReport {
    pub rows: Vec<HindcastRow>,
    pub mae_by_sensor: BTreeMap<SensorKey, f64>,
}

impl HindcastReport {
    pub fn overall_mae(&self) -> Option<f64> {
        if self.rows.is_empty() {
            return None;
        }
        Some(self.rows.iter().map(HindcastRow::absolute_error).sum::<f64>() / self.rows.len() as f64)
    }
}

/// Pair 1-day-ahead predictions for days before `run_date` with the pm2_5
/// later observed for the same sensor and day.
pub fn hindcast(
    predictions: &[PredictionRow],
    observed: &[AirQualityRecord],
    run_date: NaiveDate,
) -> HindcastReport {
    let actual: HashMap<(SensorKey, NaiveDate), f64> = observed
        .iter()
        .filter(|r| r.is_observed())
        .map(|r| ((r.location.clone(), r.date), r.pm2_5))
        .collect();

    let mut rows: Vec<HindcastRow> = predictions
        .iter()
        .filter(|p| p.days_before_forecast_day == 1 && p.date < run_date)
        .filter_map(|p| {
            let pm2_5 = *actual.get(&(p.key(), p.date))?;
            Some(HindcastRow {
                date: p.date,
                city_name: p.city_name.clone(),
                sensor_id: p.sensor_id.clone(),
                pm2_5_pred: p.pm2_5_pred,
                pm2_5,
            })
        })
        .collect();
    rows.sort_by(|a, b| (&a.city_name, &a.sensor_id, a.date).cmp(&(&b.city_name, &b.sensor_id, b.date)));

    let mut errors: BTreeMap<SensorKey, (f64, usize)> = BTreeMap::new();
    for row in &rows {
        let entry = errors
            .entry(SensorKey::new(row.city_name.clone(), row.sensor_id.clone()))
            .or_insert((0.0, 0));
        entry.0 += row.absolute_error();
        entry.1 += 1;
    }

    HindcastReport {
        rows,
        mae_by_sensor: errors
            .into_iter()
            .map(|(key, (sum, n))| (key, sum / n as f64))
            .collect(),
    }
}
