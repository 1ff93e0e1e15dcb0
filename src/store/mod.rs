pub mod backend;
pub mod dataset;
pub mod feature_store;
pub mod parquet_backend;
pub mod record;

pub use backend::{MemoryBackend, StoreBackend};
pub use dataset::{DatasetId, DatasetMeta, DatasetSpec, InsertReport, RowFilter};
pub use feature_store::{FeatureGroup, FeatureStore, FeatureView};
pub use parquet_backend::{ParquetBackend, ParquetCompression};
pub use record::{date_to_days, days_to_date, StoredRecord};
