//! House Price ML - сервис предсказания цен на дома
//!
//! CSV -> приведение к контракту признаков -> обученный конвейер -> цены.

pub mod config;
pub mod error;
pub mod models;
pub mod preprocessing;
pub mod server;
pub mod service;
pub mod store;
pub mod types;

pub use error::{PredictionError, Result};
pub use models::*;
pub use preprocessing::*;
pub use types::*;

// Re-export для удобства
pub use crate::config::{AppConfig, FeatureConfig};
pub use service::{PredictionRun, PredictionService};
pub use store::{ResultStore, ResultToken};
