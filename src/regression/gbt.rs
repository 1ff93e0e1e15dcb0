use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::regression::tree::{CartBuilder, Node, TreeConfig};
use crate::regression::Regressor;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GbtParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub tree: TreeConfig,
}

impl Default for GbtParams {
    fn default() -> Self {
        Self {
            n_estimators: 450,
            learning_rate: 0.08,
            tree: TreeConfig::default(),
        }
    }
}

/// Squared-error gradient boosting over regression trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    feature_names: Vec<String>,
    params: GbtParams,
    base_score: f64,
    trees: Vec<Node>,
}

impl GradientBoostedRegressor {
    pub fn fit(
        features: &[Vec<f64>],
        targets: &[f64],
        feature_names: Vec<String>,
        params: GbtParams,
    ) -> Result<Self> {
        if features.is_empty() {
            return Err(PipelineError::Model("cannot fit on an empty training set".to_string()));
        }
        if features.len() != targets.len() {
            return Err(PipelineError::Model(format!(
                "{} feature rows but {} targets",
                features.len(),
                targets.len()
            )));
        }
        if let Some(row) = features.iter().find(|r| r.len() != feature_names.len()) {
            return Err(PipelineError::Model(format!(
                "feature row has {} values, expected {}",
                row.len(),
                feature_names.len()
            )));
        }
        if targets.iter().any(|t| !t.is_finite()) {
            return Err(PipelineError::Model("targets must be finite".to_string()));
        }

        let base_score = targets.iter().sum::<f64>() / targets.len() as f64;
        let mut predictions = vec![base_score; targets.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let builder = CartBuilder::new(features, params.tree);

        for round in 0..params.n_estimators {
            let residuals: Vec<f64> = targets
                .iter()
                .zip(&predictions)
                .map(|(y, p)| y - p)
                .collect();

            let tree = builder.build(&residuals);
            for (prediction, row) in predictions.iter_mut().zip(features) {
                *prediction += params.learning_rate * tree.predict(row);
            }
            trees.push(tree);

            if round % 50 == 0 {
                let mse = residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64;
                debug!(round, mse, "Boosting progress");
            }
        }

        Ok(Self {
            feature_names,
            params,
            base_score,
            trees,
        })
    }

    pub fn params(&self) -> &GbtParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for GradientBoostedRegressor {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &[f64]) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|tree| self.params.learning_rate * tree.predict(features))
                .sum::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    fn small_params() -> GbtParams {
        GbtParams {
            n_estimators: 60,
            learning_rate: 0.2,
            tree: TreeConfig {
                max_depth: 3,
                min_samples_leaf: 1,
            },
        }
    }

    #[test]
    fn test_fits_linear_signal() {
        let features: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let targets: Vec<f64> = (0..50).map(|i| 2.0 * i as f64 + 1.0).collect();

        let model = GradientBoostedRegressor::fit(&features, &targets, names(2), small_params()).unwrap();
        let mae: f64 = features
            .iter()
            .zip(&targets)
            .map(|(x, y)| (model.predict(x) - y).abs())
            .sum::<f64>()
            / targets.len() as f64;

        assert!(mae < 2.0, "training MAE too high: {}", mae);
        assert_eq!(model.n_trees(), 60);
    }

    #[test]
    fn test_predicts_with_missing_features() {
        let features: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..20).map(|i| i as f64).collect();

        let model = GradientBoostedRegressor::fit(&features, &targets, names(1), small_params()).unwrap();
        assert!(model.predict(&[f64::NAN]).is_finite());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(GradientBoostedRegressor::fit(&[], &[], names(1), small_params()).is_err());
        assert!(GradientBoostedRegressor::fit(&[vec![1.0]], &[1.0, 2.0], names(1), small_params()).is_err());
        assert!(GradientBoostedRegressor::fit(&[vec![1.0, 2.0]], &[1.0], names(1), small_params()).is_err());
    }

    #[test]
    fn test_json_roundtrip_preserves_predictions() {
        let features: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, f64::NAN]).collect();
        let targets: Vec<f64> = (0..30).map(|i| (i as f64).sqrt()).collect();
        let model = GradientBoostedRegressor::fit(&features, &targets, names(2), small_params()).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let restored: GradientBoostedRegressor = serde_json::from_str(&json).unwrap();
        let (a, b) = (model.predict(&[7.0, f64::NAN]), restored.predict(&[7.0, f64::NAN]));
        assert!((a - b).abs() < 1e-9);
    }
}
