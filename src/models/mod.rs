/// Модели: конвейер цен и адаптер инференса

pub mod pipeline;
pub mod predictor;
pub mod statistics;

pub use pipeline::{LinearRegressor, PipelineArtifact, PipelineStep, PricePipeline};
pub use predictor::{InferenceAdapter, Predictions, Predictor, TargetTransform};
pub use statistics::{format_currency, PredictionStats};
