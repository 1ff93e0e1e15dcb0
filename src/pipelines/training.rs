use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::models::{FeatureRow, FEATURE_COLUMNS};
use crate::pipelines::PipelineContext;
use crate::processors::{apply_label_cutoff, JoinMode, TestSplit, TrainingSet};
use crate::regression::{ErrorMetrics, GbtParams, GradientBoostedRegressor, ModelCard, Regressor, TreeConfig};
use crate::store::StoreBackend;

/// Fit a model on the city's feature view and register it.
///
/// `threads` bounds the split-search pool; `None` uses rayon's global pool.
pub fn train<B: StoreBackend>(ctx: &PipelineContext<B>, threads: Option<usize>) -> Result<ModelCard> {
    let view = ctx.feature_view();
    let rows = view.get_batch_data(JoinMode::Inner, None)?;
    if rows.is_empty() {
        return Err(PipelineError::MissingData(format!(
            "feature view {} v{} is empty; run the backfill first",
            view.name(),
            view.version()
        )));
    }

    let training = &ctx.settings.training;
    let rows = apply_label_cutoff(rows, training.label_cutoff_days);
    let set = TrainingSet::split(rows, TestSplit::Fraction(training.test_fraction));
    if set.is_empty() {
        return Err(PipelineError::Model(
            "no rows with a label and complete lags to train on".to_string(),
        ));
    }
    info!(train = set.train.len(), test = set.test.len(), "Prepared training set");

    let (features, targets) = matrix(&set.train);
    let params = GbtParams {
        n_estimators: training.n_estimators,
        learning_rate: training.learning_rate,
        tree: TreeConfig {
            max_depth: training.max_depth,
            min_samples_leaf: training.min_samples_leaf,
        },
    };
    let names: Vec<String> = FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect();
    let fit = || GradientBoostedRegressor::fit(&features, &targets, names, params);

    let model = match threads {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build a {}-thread pool: {}", n, e)))?
            .install(fit)?,
        None => fit()?,
    };

    let (eval_rows, label) = if set.test.is_empty() {
        warn!("Held-out split is empty; reporting in-sample metrics");
        (&set.train, "train")
    } else {
        (&set.test, "test")
    };
    let (test_features, test_targets) = matrix(eval_rows);
    let predictions: Vec<f64> = test_features.iter().map(|x| model.predict(x)).collect();
    let metrics = ErrorMetrics::evaluate(&predictions, &test_targets, set.train.len());
    info!(split = label, mae = metrics.mae, rmse = metrics.rmse, r2 = metrics.r2, "Evaluated model");

    // New version every run; the pinned version in the city config only selects what inference loads
    ctx.registry.save(&ctx.city.model_registry.name, None, &model, &metrics)
}

fn matrix(rows: &[FeatureRow]) -> (Vec<Vec<f64>>, Vec<f64>) {
    rows.iter()
        .filter_map(|r| r.pm2_5.map(|y| (r.feature_vector(), y)))
        .unzip()
}
