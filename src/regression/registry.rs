use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::regression::{ErrorMetrics, GradientBoostedRegressor};
use crate::utils::constants::{MODEL_FILE, MODEL_METRICS_FILE};

/// Metadata written next to every registered model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCard {
    pub name: String,
    pub version: u32,
    pub feature_names: Vec<String>,
    pub metrics: ErrorMetrics,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Versioned model directory: `<root>/<name>/v<version>/{model,metrics}.json`.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    root: PathBuf,
}

impl ModelRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, name: &str, version: u32) -> PathBuf {
        self.root.join(name).join(format!("v{}", version))
    }

    /// Registered versions of `name`, ascending.
    pub fn versions(&self, name: &str) -> Result<Vec<u32>> {
        let dir = self.root.join(name);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut versions: Vec<u32> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join(MODEL_FILE).exists())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|s| s.strip_prefix('v'))
                    .and_then(|s| s.parse().ok())
            })
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    pub fn latest_version(&self, name: &str) -> Result<Option<u32>> {
        Ok(self.versions(name)?.last().copied())
    }

    /// Persist a model; without an explicit version the next free one is used.
    pub fn save(
        &self,
        name: &str,
        version: Option<u32>,
        model: &GradientBoostedRegressor,
        metrics: &ErrorMetrics,
    ) -> Result<ModelCard> {
        use crate::regression::Regressor;

        let version = match version {
            Some(v) => v,
            None => self.latest_version(name)?.map_or(1, |v| v + 1),
        };
        let dir = self.version_dir(name, version);
        fs::create_dir_all(&dir)?;

        let card = ModelCard {
            name: name.to_string(),
            version,
            feature_names: model.feature_names().to_vec(),
            metrics: metrics.clone(),
            created_at: chrono::Utc::now(),
        };

        write_json_atomic(&dir, MODEL_METRICS_FILE, &card)?;
        // Model file last: a version only counts once it exists
        write_json_atomic(&dir, MODEL_FILE, model)?;

        info!(
            model = name,
            version,
            mae = metrics.mae,
            "Registered model"
        );
        Ok(card)
    }

    /// Load the given version, or the latest when `version` is `None`.
    pub fn load(&self, name: &str, version: Option<u32>) -> Result<(GradientBoostedRegressor, ModelCard)> {
        let version = match version {
            Some(v) => v,
            None => self
                .latest_version(name)?
                .ok_or_else(|| PipelineError::MissingArtifact(self.root.join(name)))?,
        };

        let dir = self.version_dir(name, version);
        let model_path = dir.join(MODEL_FILE);
        if !model_path.exists() {
            return Err(PipelineError::MissingArtifact(model_path));
        }

        let model: GradientBoostedRegressor = serde_json::from_slice(&fs::read(&model_path)?)?;
        let card: ModelCard = serde_json::from_slice(&fs::read(dir.join(MODEL_METRICS_FILE))?)?;
        Ok((model, card))
    }
}

fn write_json_atomic<T: Serialize + ?Sized>(dir: &Path, file_name: &str, value: &T) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush()?;
    tmp.persist(dir.join(file_name)).map_err(|e| e.error)?;
    Ok(())
}
