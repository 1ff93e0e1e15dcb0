pub mod aggregator;
pub mod batch_predictor;
pub mod feature_assembler;
pub mod quality_filter;

pub use aggregator::{aggregate_air_quality, aggregate_weather};
pub use batch_predictor::{
    anchor_date, hindcast, latest_forecast, relabel_forecast, BatchPredictor, HindcastReport,
};
pub use feature_assembler::{
    apply_label_cutoff, replicate_weather, FeatureAssembler, JoinMode, TestSplit, TrainingSet,
};
pub use quality_filter::{
    Bound, FilterOutcome, QualityCheck, QualityField, QualityFilter, QualityRules, Rejection,
    Violation,
};
