use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::models::{AirQualityRecord, PredictionRow, WeatherRecord};
use crate::utils::constants::{
    DEFAULT_MAX_REJECTED_FRACTION, PM25_MAX, PM25_MIN, TEMP_MAX, TEMP_MIN, WIND_MAX, WIND_MIN,
};

/// Interval with independently inclusive/exclusive ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
    pub min_inclusive: bool,
    pub max_inclusive: bool,
}

impl Bound {
    /// `[min, max]`
    pub fn closed(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            min_inclusive: true,
            max_inclusive: true,
        }
    }

    /// `(min, max)`
    pub fn open(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            min_inclusive: false,
            max_inclusive: false,
        }
    }

    /// `[min, max)`
    pub fn half_open(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            min_inclusive: true,
            max_inclusive: false,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        let above_min = if self.min_inclusive {
            value >= self.min
        } else {
            value > self.min
        };
        let below_max = if self.max_inclusive {
            value <= self.max
        } else {
            value < self.max
        };
        above_min && below_max
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}, {}{}",
            if self.min_inclusive { '[' } else { '(' },
            self.min,
            self.max,
            if self.max_inclusive { ']' } else { ')' }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityField {
    Pm25,
    Temperature,
    WindSpeed,
    WindGusts,
}

impl QualityField {
    pub fn column(&self) -> &'static str {
        match self {
            QualityField::Pm25 => "pm2_5",
            QualityField::Temperature => "temp_max",
            QualityField::WindSpeed => "wind_speed_max",
            QualityField::WindGusts => "wind_gusts_max",
        }
    }
}

/// Plausibility rules applied before anything is written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityRules {
    pub pm25: Bound,
    pub temperature: Bound,
    pub wind: Bound,
    /// Share of a batch that may be rejected before the batch itself fails.
    pub max_rejected_fraction: f64,
}

impl Default for QualityRules {
    fn default() -> Self {
        Self {
            pm25: Bound::closed(PM25_MIN, PM25_MAX),
            temperature: Bound::open(TEMP_MIN, TEMP_MAX),
            wind: Bound::half_open(WIND_MIN, WIND_MAX),
            max_rejected_fraction: DEFAULT_MAX_REJECTED_FRACTION,
        }
    }
}

impl QualityRules {
    pub fn with_pm25_max_inclusive(mut self, inclusive: bool) -> Self {
        self.pm25.max_inclusive = inclusive;
        self
    }

    pub fn with_max_rejected_fraction(mut self, fraction: f64) -> Self {
        self.max_rejected_fraction = fraction;
        self
    }

    pub fn bound(&self, field: QualityField) -> Bound {
        match field {
            QualityField::Pm25 => self.pm25,
            QualityField::Temperature => self.temperature,
            QualityField::WindSpeed | QualityField::WindGusts => self.wind,
        }
    }
}

/// Exposes the rule-checked fields a record actually carries.
pub trait QualityCheck {
    fn quality_fields(&self) -> Vec<(QualityField, f64)>;
}

impl QualityCheck for AirQualityRecord {
    fn quality_fields(&self) -> Vec<(QualityField, f64)> {
        vec![(QualityField::Pm25, self.pm2_5)]
    }
}

impl QualityCheck for WeatherRecord {
    fn quality_fields(&self) -> Vec<(QualityField, f64)> {
        [
            (QualityField::Temperature, self.temp_max),
            (QualityField::WindSpeed, self.wind_speed_max),
            (QualityField::WindGusts, self.wind_gusts_max),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
        .collect()
    }
}

impl QualityCheck for PredictionRow {
    fn quality_fields(&self) -> Vec<(QualityField, f64)> {
        self.pm2_5
            .map(|v| vec![(QualityField::Pm25, v)])
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub field: QualityField,
    pub value: f64,
    pub bound: Bound,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {} outside {}",
            self.field.column(),
            self.value,
            self.bound
        )
    }
}

#[derive(Debug, Clone)]
pub struct Rejection<R> {
    pub record: R,
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone)]
pub struct FilterOutcome<R> {
    pub accepted: Vec<R>,
    pub rejected: Vec<Rejection<R>>,
}

impl<R> FilterOutcome<R> {
    pub fn total(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }

    pub fn rejected_fraction(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.rejected.len() as f64 / self.total() as f64
        }
    }

    /// Fail the whole batch when more than `max_fraction` was rejected.
    pub fn ensure_acceptable(&self, dataset: &str, max_fraction: f64) -> Result<()> {
        if self.rejected_fraction() > max_fraction {
            let examples: Vec<String> = self
                .rejected
                .iter()
                .take(3)
                .flat_map(|r| r.violations.iter().map(|v| v.to_string()))
                .collect();
            return Err(PipelineError::validation(
                dataset,
                format!(
                    "{} of {} records rejected ({:.1}% > {:.1}%), e.g. {}",
                    self.rejected.len(),
                    self.total(),
                    100.0 * self.rejected_fraction(),
                    100.0 * max_fraction,
                    examples.join("; ")
                ),
            ));
        }
        Ok(())
    }
}

/// Drops records with any present field outside its plausible range.
/// Values are never clipped.
#[derive(Debug, Clone, Default)]
pub struct QualityFilter {
    rules: QualityRules,
}

impl QualityFilter {
    pub fn new(rules: QualityRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &QualityRules {
        &self.rules
    }

    pub fn check<R: QualityCheck>(&self, record: &R) -> Vec<Violation> {
        record
            .quality_fields()
            .into_iter()
            .filter_map(|(field, value)| {
                let bound = self.rules.bound(field);
                (!bound.contains(value)).then_some(Violation {
                    field,
                    value,
                    bound,
                })
            })
            .collect()
    }

    pub fn filter<R: QualityCheck>(&self, records: Vec<R>) -> FilterOutcome<R> {
        let mut outcome = FilterOutcome {
            accepted: Vec::with_capacity(records.len()),
            rejected: Vec::new(),
        };

        for record in records {
            let violations = self.check(&record);
            if violations.is_empty() {
                outcome.accepted.push(record);
            } else {
                outcome.rejected.push(Rejection { record, violations });
            }
        }

        outcome
    }

    /// Filter, log rejections, and fail when the batch is mostly bad.
    pub fn apply<R: QualityCheck>(&self, dataset: &str, records: Vec<R>) -> Result<FilterOutcome<R>> {
        let outcome = self.filter(records);

        if !outcome.rejected.is_empty() {
            warn!(
                dataset,
                rejected = outcome.rejected.len(),
                total = outcome.total(),
                first = %outcome.rejected[0].violations[0],
                "Dropped records failing quality rules"
            );
        }

        outcome.ensure_acceptable(dataset, self.rules.max_rejected_fraction)?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LocationKey, SensorKey};
    use chrono::NaiveDate;

    fn aq(pm2_5: f64) -> AirQualityRecord {
        AirQualityRecord::observed(
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            SensorKey::new("c", "s"),
            pm2_5,
        )
    }

    fn weather(temp: Option<f64>, wind: Option<f64>) -> WeatherRecord {
        WeatherRecord::new(
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            LocationKey::sensor("c", "s"),
        )
        .with_temp_max(temp)
        .with_wind_speed_max(wind)
    }

    #[test]
    fn test_pm25_boundaries_inclusive() {
        let filter = QualityFilter::new(QualityRules::default().with_pm25_max_inclusive(true));
        assert!(!filter.check(&aq(-1.0)).is_empty());
        assert!(filter.check(&aq(0.0)).is_empty());
        assert!(filter.check(&aq(500.0)).is_empty());
        assert!(!filter.check(&aq(501.0)).is_empty());
    }

    #[test]
    fn test_pm25_boundaries_exclusive() {
        let filter = QualityFilter::new(QualityRules::default().with_pm25_max_inclusive(false));
        assert!(!filter.check(&aq(-1.0)).is_empty());
        assert!(filter.check(&aq(0.0)).is_empty());
        assert!(filter.check(&aq(499.9)).is_empty());
        assert!(!filter.check(&aq(500.0)).is_empty());
        assert!(!filter.check(&aq(501.0)).is_empty());
    }

    #[test]
    fn test_weather_rules_apply_to_present_fields_only() {
        let filter = QualityFilter::default();
        assert!(filter.check(&weather(None, None)).is_empty());
        assert!(filter.check(&weather(Some(69.9), Some(0.0))).is_empty());
        assert_eq!(filter.check(&weather(Some(70.0), None)).len(), 1);
        assert_eq!(filter.check(&weather(Some(-70.0), Some(80.0))).len(), 2);
        assert_eq!(filter.check(&weather(None, Some(-0.5)))[0].field, QualityField::WindSpeed);
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let filter = QualityFilter::default();
        assert!(!filter.check(&aq(f64::NAN)).is_empty());
    }

    #[test]
    fn test_filter_is_idempotent() {
        let filter = QualityFilter::default();
        let records = vec![aq(-3.0), aq(12.0), aq(800.0), aq(0.0), aq(499.0)];

        let once = filter.filter(records).accepted;
        let twice = filter.filter(once.clone()).accepted;

        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn test_apply_fails_when_batch_mostly_rejected() {
        let filter = QualityFilter::new(QualityRules::default().with_max_rejected_fraction(0.5));

        let ok = filter.apply("air_quality", vec![aq(1.0), aq(-1.0)]);
        assert!(ok.is_ok());

        let err = filter
            .apply("air_quality", vec![aq(1.0), aq(-1.0), aq(900.0)])
            .unwrap_err();
        assert!(matches!(err, PipelineError::ValidationFailed { .. }));
    }

    #[test]
    fn test_bound_display() {
        assert_eq!(Bound::half_open(0.0, 80.0).to_string(), "[0, 80)");
        assert_eq!(Bound::open(-70.0, 70.0).to_string(), "(-70, 70)");
    }
}
