use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::Result;
use crate::store::{DatasetId, DatasetMeta, StoreBackend};
use crate::utils::constants::{DATASET_DATA_FILE, DATASET_METADATA_FILE, DEFAULT_ROW_GROUP_SIZE};

/// Codec for `data.parquet`, selected by `storage.compression`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    #[default]
    Snappy,
    Gzip,
    Lz4,
    Zstd,
    None,
}

impl ParquetCompression {
    fn codec(self) -> Compression {
        match self {
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Lz4 => Compression::LZ4_RAW,
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::None => Compression::UNCOMPRESSED,
        }
    }
}

/// One directory per dataset version under `root`, holding `data.parquet`
/// and `metadata.json`. Both files are replaced atomically.
pub struct ParquetBackend {
    root: PathBuf,
    compression: ParquetCompression,
    row_group_size: usize,
}

impl ParquetBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            compression: ParquetCompression::default(),
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    /// Applies to datasets written from now on; existing files keep their codec.
    pub fn with_compression(mut self, compression: ParquetCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_row_group_size(mut self, rows: usize) -> Self {
        self.row_group_size = rows.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dataset_dir(&self, id: &DatasetId) -> PathBuf {
        self.root.join(id.dir_name())
    }

    fn replace_file(dir: &Path, file_name: &str, write: impl FnOnce(&mut File) -> Result<()>) -> Result<()> {
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        write(tmp.as_file_mut())?;
        tmp.as_file_mut().flush()?;
        tmp.persist(dir.join(file_name)).map_err(|e| e.error)?;
        Ok(())
    }
}

impl StoreBackend for ParquetBackend {
    fn read_meta(&self, id: &DatasetId) -> Result<Option<DatasetMeta>> {
        let path = self.dataset_dir(id).join(DATASET_METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&fs::read(path)?)?))
    }

    fn write_meta(&self, meta: &DatasetMeta) -> Result<()> {
        Self::replace_file(&self.dataset_dir(&meta.id), DATASET_METADATA_FILE, |file| {
            serde_json::to_writer_pretty(file, meta)?;
            Ok(())
        })
    }

    fn read_batches(&self, id: &DatasetId) -> Result<Vec<RecordBatch>> {
        let path = self.dataset_dir(id).join(DATASET_DATA_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?.build()?;
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
        debug!(dataset = %id, batches = batches.len(), "Read parquet dataset");
        Ok(batches)
    }

    fn write_batch(&self, id: &DatasetId, batch: &RecordBatch) -> Result<()> {
        let props = WriterProperties::builder()
            .set_compression(self.compression.codec())
            .set_max_row_group_size(self.row_group_size)
            .build();

        Self::replace_file(&self.dataset_dir(id), DATASET_DATA_FILE, |file| {
            let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
            writer.write(batch)?;
            writer.close()?;
            Ok(())
        })?;

        debug!(dataset = %id, rows = batch.num_rows(), "Wrote parquet dataset");
        Ok(())
    }

    fn list(&self) -> Result<Vec<DatasetMeta>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut metas = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path().join(DATASET_METADATA_FILE);
            if path.exists() {
                metas.push(serde_json::from_slice::<DatasetMeta>(&fs::read(path)?)?);
            }
        }
        metas.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(metas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AirQualityRecord, SensorKey};
    use crate::store::{DatasetSpec, StoredRecord};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn test_batch_roundtrip_through_disk() {
        let dir = TempDir::new().unwrap();
        let backend = ParquetBackend::new(dir.path());
        let id = DatasetId::new("air_quality", 1);

        assert!(backend.read_batches(&id).unwrap().is_empty());

        let records = vec![AirQualityRecord::observed(
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            SensorKey::new("Gothenburg", "femman"),
            12.5,
        )];
        backend.write_batch(&id, &AirQualityRecord::to_batch(&records).unwrap()).unwrap();

        let batches = backend.read_batches(&id).unwrap();
        let restored: Vec<AirQualityRecord> = batches
            .iter()
            .flat_map(|b| AirQualityRecord::from_batch(b).unwrap())
            .collect();
        assert_eq!(restored, records);
        assert!(dir.path().join("air_quality_1").join(DATASET_DATA_FILE).exists());
    }

    #[test]
    fn test_metadata_listing() {
        let dir = TempDir::new().unwrap();
        let backend = ParquetBackend::new(dir.path());
        let spec = DatasetSpec::new("weather", 2).with_primary_key(["city_name", "date"]);

        backend.write_meta(&DatasetMeta::from_spec(&spec)).unwrap();

        let listed = backend.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, DatasetId::new("weather", 2));
        assert_eq!(
            backend.read_meta(&spec.id).unwrap().unwrap().primary_key,
            vec!["city_name", "date"]
        );
    }

    #[test]
    fn test_configured_codec_is_written() {
        let dir = TempDir::new().unwrap();
        let backend = ParquetBackend::new(dir.path())
            .with_compression(ParquetCompression::Zstd)
            .with_row_group_size(1);
        let id = DatasetId::new("air_quality", 1);
        let key = SensorKey::new("Gothenburg", "femman");
        let records: Vec<AirQualityRecord> = (1..=3)
            .map(|d| AirQualityRecord::observed(NaiveDate::from_ymd_opt(2024, 1, d).unwrap(), key.clone(), d as f64))
            .collect();
        backend.write_batch(&id, &AirQualityRecord::to_batch(&records).unwrap()).unwrap();

        let file = File::open(dir.path().join("air_quality_1").join(DATASET_DATA_FILE)).unwrap();
        let metadata = ParquetRecordBatchReaderBuilder::try_new(file).unwrap().metadata().clone();
        assert_eq!(metadata.num_row_groups(), 3);
        assert!(matches!(metadata.row_group(0).column(0).compression(), Compression::ZSTD(_)));
    }
}
