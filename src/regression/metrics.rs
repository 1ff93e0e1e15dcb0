use serde::{Deserialize, Serialize};

/// Held-out evaluation of a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    /// Mean absolute error
    #[serde(with = "nan_as_null")]
    pub mae: f64,
    /// Root mean squared error
    #[serde(with = "nan_as_null")]
    pub rmse: f64,
    /// Coefficient of determination; NaN when the targets are constant
    #[serde(with = "nan_as_null")]
    pub r2: f64,
    pub n_train: usize,
    pub n_test: usize,
}

impl ErrorMetrics {
    pub fn evaluate(predictions: &[f64], targets: &[f64], n_train: usize) -> Self {
        Self {
            mae: mae(predictions, targets),
            rmse: rmse(predictions, targets),
            r2: r2(predictions, targets),
            n_train,
            n_test: targets.len(),
        }
    }
}

/// JSON has no NaN; undefined metrics are stored as `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

pub fn mae(predictions: &[f64], targets: &[f64]) -> f64 {
    if targets.is_empty() {
        return f64::NAN;
    }
    predictions
        .iter()
        .zip(targets)
        .map(|(p, y)| (p - y).abs())
        .sum::<f64>()
        / targets.len() as f64
}

pub fn rmse(predictions: &[f64], targets: &[f64]) -> f64 {
    if targets.is_empty() {
        return f64::NAN;
    }
    let mse = predictions
        .iter()
        .zip(targets)
        .map(|(p, y)| (p - y).powi(2))
        .sum::<f64>()
        / targets.len() as f64;
    mse.sqrt()
}

pub fn r2(predictions: &[f64], targets: &[f64]) -> f64 {
    if targets.is_empty() {
        return f64::NAN;
    }
    let mean = targets.iter().sum::<f64>() / targets.len() as f64;
    let ss_tot: f64 = targets.iter().map(|y| (y - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return f64::NAN;
    }
    let ss_res: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, y)| (y - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}
