use std::path::PathBuf;
use thiserror::Error;

use crate::sources::TransportError;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("Source unavailable: {endpoint} failed after {attempts} attempt(s): {source}")]
    SourceUnavailable {
        endpoint: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("Schema mismatch in {origin}: {message}")]
    SchemaMismatch { origin: String, message: String },

    #[error("Validation failed for dataset '{dataset}': {message}")]
    ValidationFailed { dataset: String, message: String },

    #[error("No data for inference: {0}")]
    NoDataForInference(String),

    #[error("Required artifact not found: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub fn schema(origin: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::SchemaMismatch {
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn validation(dataset: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::ValidationFailed {
            dataset: dataset.into(),
            message: message.into(),
        }
    }
}
