use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// What to do with a series value the parser marked as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Remove the row.
    #[default]
    Drop,
    /// Carry the previous value in date order forward. Leading gaps are dropped.
    ForwardFill,
}

impl MissingValuePolicy {
    /// Resolve missing values in one series. The output is sorted by date.
    pub fn apply(&self, mut series: Vec<(NaiveDate, Option<f64>)>) -> Vec<(NaiveDate, f64)> {
        series.sort_by_key(|(date, _)| *date);

        match self {
            MissingValuePolicy::Drop => series
                .into_iter()
                .filter_map(|(date, value)| value.map(|v| (date, v)))
                .collect(),
            MissingValuePolicy::ForwardFill => {
                let mut last = None;
                series
                    .into_iter()
                    .filter_map(|(date, value)| {
                        if value.is_some() {
                            last = value;
                        }
                        last.map(|v| (date, v))
                    })
                    .collect()
            }
        }
    }
}

/// A required column must carry at least one value in a non-empty batch.
pub fn require_values(dataset: &str, column: &str, values: &[Option<f64>]) -> Result<()> {
    if !values.is_empty() && values.iter().all(Option::is_none) {
        return Err(PipelineError::validation(
            dataset,
            format!(
                "column '{}' has no non-null values in {} rows",
                column,
                values.len()
            ),
        ));
    }
    Ok(())
}
