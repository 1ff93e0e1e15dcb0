use chrono::{Duration, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::models::{AirQualityRecord, PredictionRow, FEATURE_COLUMNS};
use crate::pipelines::PipelineContext;
use crate::processors::{hindcast, latest_forecast, BatchPredictor, HindcastReport, JoinMode};
use crate::regression::Regressor;
use crate::store::StoreBackend;
use crate::utils::constants::{AIR_QUALITY_DATASET, FORECAST_FILE, HINDCAST_FILE, PREDICTIONS_DATASET};
use crate::writers::CsvArtifactWriter;

#[derive(Debug, Clone, PartialEq)]
pub struct PredictSummary {
    pub rows: usize,
    /// Rows dated after the run date.
    pub forecast_rows: usize,
    pub model_version: u32,
    pub output: PathBuf,
}

/// Batch inference over the recent feature view: writes the predictions
/// artifact and upserts the `aq_predictions` dataset.
pub fn predict<B: StoreBackend>(
    ctx: &PipelineContext<B>,
    run_date: NaiveDate,
    output: Option<&Path>,
) -> Result<PredictSummary> {
    let start = run_date - Duration::days(ctx.settings.inference.lookback_days);
    let rows = ctx.feature_view().get_batch_data(JoinMode::Left, Some(start))?;
    if rows.is_empty() {
        return Err(PipelineError::NoDataForInference(format!(
            "feature view has no rows since {}; run the feature pipeline",
            start
        )));
    }

    let model_ref = &ctx.city.model_registry;
    let (model, card) = ctx.registry.load(&model_ref.name, model_ref.version)?;
    if model.feature_names().iter().map(String::as_str).ne(FEATURE_COLUMNS) {
        return Err(PipelineError::Model(format!(
            "model {} v{} was trained on {:?}, expected {:?}",
            card.name,
            card.version,
            model.feature_names(),
            FEATURE_COLUMNS
        )));
    }

    let predictions = BatchPredictor::new(&model)
        .with_window(ctx.settings.inference.window)
        .predict(&rows, run_date)?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ctx.settings.predictions_path());
    CsvArtifactWriter::new().write_rows(&predictions, &output)?;
    ctx.predictions()?.insert(predictions.clone())?;

    let summary = PredictSummary {
        rows: predictions.len(),
        forecast_rows: predictions.iter().filter(|p| p.is_forecast()).count(),
        model_version: card.version,
        output,
    };
    info!(
        city = %ctx.city.city_name,
        %run_date,
        rows = summary.rows,
        forecast_rows = summary.forecast_rows,
        model_version = summary.model_version,
        "Batch inference complete"
    );
    Ok(summary)
}

/// The latest issued forecast per sensor, re-anchored on `run_date`, for
/// the next `days` days (the city's horizon by default).
pub fn forecast<B: StoreBackend>(
    ctx: &PipelineContext<B>,
    run_date: NaiveDate,
    days: Option<u32>,
) -> Result<(Vec<PredictionRow>, PathBuf)> {
    let horizon = i64::from(days.unwrap_or(ctx.city.forecast_days));
    let rows = latest_forecast(&stored_predictions(ctx)?, run_date, horizon);
    if rows.is_empty() {
        return Err(PipelineError::MissingData(format!(
            "no forecast issued on or before {}; run predict first",
            run_date
        )));
    }

    let output = ctx.settings.artifacts_dir.join(FORECAST_FILE);
    CsvArtifactWriter::new().write_rows(&rows, &output)?;
    Ok((rows, output))
}

/// Compare past 1-day-ahead predictions with what was observed and write
/// the hindcast artifact.
pub fn hindcast_report<B: StoreBackend>(
    ctx: &PipelineContext<B>,
    run_date: NaiveDate,
) -> Result<(HindcastReport, PathBuf)> {
    let predictions = stored_predictions(ctx)?;
    let observed: Vec<AirQualityRecord> = ctx
        .store
        .get_dataset::<AirQualityRecord>(AIR_QUALITY_DATASET, ctx.city.air_quality_version())?
        .read_all()?;

    let report = hindcast(&predictions, &observed, run_date);
    let output = ctx.settings.artifacts_dir.join(HINDCAST_FILE);
    CsvArtifactWriter::new().write_rows(&report.rows, &output)?;

    info!(
        city = %ctx.city.city_name,
        rows = report.rows.len(),
        mae = report.overall_mae().unwrap_or(f64::NAN),
        "Hindcast complete"
    );
    Ok((report, output))
}

fn stored_predictions<B: StoreBackend>(ctx: &PipelineContext<B>) -> Result<Vec<PredictionRow>> {
    let predictions = ctx
        .store
        .get_dataset::<PredictionRow>(PREDICTIONS_DATASET, ctx.city.dataset_version(PREDICTIONS_DATASET))?
        .read_all()?;
    if predictions.is_empty() {
        return Err(PipelineError::MissingData(
            "the predictions dataset is empty; run predict first".to_string(),
        ));
    }
    Ok(predictions)
}
