pub mod gbt;
pub mod metrics;
pub mod registry;
pub mod tree;

pub use gbt::{GbtParams, GradientBoostedRegressor};
pub use metrics::{mae, r2, rmse, ErrorMetrics};
pub use registry::{ModelCard, ModelRegistry};
pub use tree::{CartBuilder, Node, TreeConfig};

/// Anything that maps one feature vector to a pm2_5 estimate.
pub trait Regressor: Send + Sync {
    fn feature_names(&self) -> &[String];

    /// Missing inputs are passed as NaN.
    fn predict(&self, features: &[f64]) -> f64;
}
