//! Один запрос: CSV -> нормализация -> инференс -> таблица результатов

use tracing::{info, warn};

use crate::config::{FeatureConfig, InferenceSettings};
use crate::error::{PredictionError, Result};
use crate::models::{InferenceAdapter, PredictionStats, Predictions};
use crate::preprocessing::{read_csv, NormalizedBatch, SchemaNormalizer};
use crate::types::{RecordSet, REAL_UNIT_COLUMN, TRANSFORMED_COLUMN};

/// Результат одного запуска
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRun {
    /// Колонки FEATURES, затем `Prediccion_Escalada`, затем `Precio_Predicho_USD`
    pub table: RecordSet,
    pub predictions: Predictions,
    pub stats: PredictionStats,
    pub rows_received: usize,
    pub rows_dropped: usize,
}

pub struct PredictionService {
    features: FeatureConfig,
    adapter: InferenceAdapter,
    limits: InferenceSettings,
}

impl PredictionService {
    pub fn new(features: FeatureConfig, adapter: InferenceAdapter, limits: InferenceSettings) -> Self {
        Self {
            features,
            adapter,
            limits,
        }
    }

    pub fn features(&self) -> &FeatureConfig {
        &self.features
    }

    /// Разбор и нормализация без вызова модели
    pub fn prepare(&self, csv: &[u8]) -> Result<NormalizedBatch> {
        let raw = read_csv(csv)?;
        if raw.len() > self.limits.max_rows {
            warn!("Upload rejected: {} rows over limit {}", raw.len(), self.limits.max_rows);
            return Err(PredictionError::TooManyRows {
                rows: raw.len(),
                limit: self.limits.max_rows,
            });
        }
        SchemaNormalizer::normalize(&raw, &self.features)
    }

    /// Синхронный запуск без таймаута
    pub fn run_blocking(&self, csv: &[u8]) -> Result<PredictionRun> {
        let batch = self.prepare(csv)?;
        let predictions = self.adapter.infer(&batch.records)?;
        assemble(batch, predictions)
    }

    /// Инференс выполняется в blocking-пуле с таймаутом, зависящим от размера батча.
    /// Поток модели по таймауту не прерывается, но ответ не ждет его завершения.
    pub async fn run(&self, csv: &[u8]) -> Result<PredictionRun> {
        let batch = self.prepare(csv)?;
        let timeout = self.limits.timeout_for(batch.records.len());
        let adapter = self.adapter.clone();

        let task = tokio::task::spawn_blocking(move || {
            let predictions = adapter.infer(&batch.records);
            (batch, predictions)
        });

        let (batch, predictions) = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                return Err(PredictionError::Inference(format!(
                    "inference task failed: {}",
                    e
                )))
            }
            Err(_) => {
                let millis = timeout.as_millis() as u64;
                warn!("Inference timed out after {}ms", millis);
                return Err(PredictionError::Timeout { millis });
            }
        };

        assemble(batch, predictions?)
    }
}

fn assemble(batch: NormalizedBatch, predictions: Predictions) -> Result<PredictionRun> {
    let mut table = batch.records;
    table.push_numeric_column(TRANSFORMED_COLUMN, &predictions.transformed)?;
    table.push_numeric_column(REAL_UNIT_COLUMN, &predictions.real)?;

    let stats = PredictionStats::from_values(&predictions.real);
    info!(
        "Prediction run: {} received, {} dropped, {} predicted",
        batch.rows_received, batch.rows_dropped, stats.total
    );

    Ok(PredictionRun {
        table,
        predictions,
        stats,
        rows_received: batch.rows_received,
        rows_dropped: batch.rows_dropped,
    })
}
