use chrono::NaiveDate;
use std::fmt;

use crate::error::Result;
use crate::pipelines::PipelineContext;
use crate::store::{DatasetId, DatasetMeta, StoreBackend};

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub id: DatasetId,
    pub rows: usize,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    /// Whether the city config points at this version.
    pub in_use: bool,
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.in_use { "*" } else { " " };
        write!(f, "{} {:<24} {:>8} rows", marker, self.id.to_string(), self.rows)?;
        if let (Some(min), Some(max)) = (self.min_date, self.max_date) {
            write!(f, "  {} .. {}", min, max)?;
        }
        Ok(())
    }
}

/// Row counts and date ranges of every dataset in the store.
pub fn inspect<B: StoreBackend>(ctx: &PipelineContext<B>) -> Result<Vec<DatasetSummary>> {
    Ok(ctx
        .store
        .datasets()?
        .into_iter()
        .map(|meta: DatasetMeta| DatasetSummary {
            in_use: ctx.city.dataset_version(&meta.id.name) == meta.id.version,
            rows: meta.row_count,
            min_date: meta.min_date,
            max_date: meta.max_date,
            id: meta.id,
        })
        .collect())
}
