pub mod cli;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipelines;
pub mod processors;
pub mod regression;
pub mod settings;
pub mod sources;
pub mod store;
pub mod utils;
pub mod writers;

pub use error::{PipelineError, Result};
