use arrow::record_batch::RecordBatch;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{PipelineError, Result};
use crate::store::{DatasetId, DatasetMeta};

/// Storage engine behind the feature store. Each dataset is one logical
/// table that is replaced whole on every write.
pub trait StoreBackend: Send + Sync {
    fn read_meta(&self, id: &DatasetId) -> Result<Option<DatasetMeta>>;
    fn write_meta(&self, meta: &DatasetMeta) -> Result<()>;
    /// Stored rows; empty when nothing has been written yet.
    fn read_batches(&self, id: &DatasetId) -> Result<Vec<RecordBatch>>;
    fn write_batch(&self, id: &DatasetId, batch: &RecordBatch) -> Result<()>;
    fn list(&self) -> Result<Vec<DatasetMeta>>;
}

#[derive(Default)]
struct MemoryDataset {
    meta: Option<DatasetMeta>,
    batch: Option<RecordBatch>,
}

/// Process-local backend for tests and dry runs.
#[derive(Default)]
pub struct MemoryBackend {
    datasets: Mutex<BTreeMap<DatasetId, MemoryDataset>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_datasets<T>(&self, f: impl FnOnce(&mut BTreeMap<DatasetId, MemoryDataset>) -> T) -> Result<T> {
        let mut guard = self
            .datasets
            .lock()
            .map_err(|_| PipelineError::Config("memory store lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

impl StoreBackend for MemoryBackend {
    fn read_meta(&self, id: &DatasetId) -> Result<Option<DatasetMeta>> {
        self.with_datasets(|d| d.get(id).and_then(|ds| ds.meta.clone()))
    }

    fn write_meta(&self, meta: &DatasetMeta) -> Result<()> {
        self.with_datasets(|d| d.entry(meta.id.clone()).or_default().meta = Some(meta.clone()))
    }

    fn read_batches(&self, id: &DatasetId) -> Result<Vec<RecordBatch>> {
        self.with_datasets(|d| {
            d.get(id)
                .and_then(|ds| ds.batch.clone())
                .into_iter()
                .collect()
        })
    }

    fn write_batch(&self, id: &DatasetId, batch: &RecordBatch) -> Result<()> {
        self.with_datasets(|d| d.entry(id.clone()).or_default().batch = Some(batch.clone()))
    }

    fn list(&self) -> Result<Vec<DatasetMeta>> {
        self.with_datasets(|d| d.values().filter_map(|ds| ds.meta.clone()).collect())
    }
}
