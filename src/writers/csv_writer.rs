use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{PipelineError, Result};

/// Writes flat artifact tables (predictions, forecast, hindcast) as CSV
/// with a header row. The target file is replaced atomically, so readers
/// never observe a partial table.
#[derive(Debug, Clone)]
pub struct CsvArtifactWriter {
    delimiter: u8,
}

impl Default for CsvArtifactWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvArtifactWriter {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Write `rows` to `path`, creating parent directories as needed.
    /// An empty slice still produces a file (with no header).
    pub fn write_rows<T: Serialize>(&self, rows: &[T], path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .delimiter(self.delimiter)
                .from_writer(tmp.as_file_mut());
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        tmp.as_file_mut().flush()?;
        tmp.persist(path).map_err(|e| e.error)?;

        info!(path = %path.display(), rows = rows.len(), "Wrote artifact");
        Ok(())
    }

    /// Read an artifact back. A missing file is `MissingArtifact`.
    pub fn read_rows<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Err(PipelineError::MissingArtifact(path.to_path_buf()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_path(path)?;

        reader
            .deserialize()
            .collect::<std::result::Result<Vec<T>, _>>()
            .map_err(PipelineError::from)
    }
}
