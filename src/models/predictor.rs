//! Адаптер инференса поверх непрозрачного конвейера

use std::sync::Arc;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{PredictionError, Result};
use crate::types::RecordSet;

/// Предсказание батча: одна строка на входе, одно значение на выходе
pub trait Predictor: Send + Sync {
    fn predict(&self, records: &RecordSet) -> Result<Array1<f64>>;

    fn name(&self) -> &str {
        "predictor"
    }
}

/// Преобразование целевой переменной, примененное при обучении.
///
/// Адаптер жестко связан с обученным конвейером: если конвейер обучен на
/// другой шкале, реальные цены будут неверными без какой-либо ошибки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetTransform {
    /// Цель обучена как ln(цена), обратное преобразование exp
    Log,
    Identity,
}

impl TargetTransform {
    pub fn inverse(&self, value: f64) -> f64 {
        match self {
            TargetTransform::Log => value.exp(),
            TargetTransform::Identity => value,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetTransform::Log => "log",
            TargetTransform::Identity => "identity",
        }
    }
}

/// Пары предсказаний в порядке строк
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predictions {
    /// Выход конвейера (логарифмическая шкала)
    pub transformed: Vec<f64>,
    /// Цена в долларах
    pub real: Vec<f64>,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }
}

#[derive(Clone)]
pub struct InferenceAdapter {
    predictor: Arc<dyn Predictor>,
    transform: TargetTransform,
}

impl InferenceAdapter {
    pub fn new(predictor: Arc<dyn Predictor>, transform: TargetTransform) -> Self {
        Self {
            predictor,
            transform,
        }
    }

    /// Весь батч либо целиком успешен, либо целиком падает
    pub fn infer(&self, records: &RecordSet) -> Result<Predictions> {
        if records.is_empty() {
            return Ok(Predictions::default());
        }

        let output = self.predictor.predict(records).map_err(|e| {
            error!("Predictor {} failed: {}", self.predictor.name(), e);
            match e {
                PredictionError::Inference(msg) => PredictionError::Inference(msg),
                other => PredictionError::Inference(other.to_string()),
            }
        })?;

        if output.len() != records.len() {
            return Err(PredictionError::Inference(format!(
                "predictor returned {} values for {} rows",
                output.len(),
                records.len()
            )));
        }

        let transformed = output.to_vec();
        let real: Vec<f64> = transformed.iter().map(|v| self.transform.inverse(*v)).collect();

        if let Some(idx) = real.iter().position(|v| !v.is_finite()) {
            return Err(PredictionError::Inference(format!(
                "non-finite prediction for row {} (transformed value {})",
                idx + 1,
                transformed[idx]
            )));
        }

        debug!("Inferred {} rows with {}", real.len(), self.predictor.name());
        Ok(Predictions { transformed, real })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::CellValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Возвращает значение колонки `LotArea` / 1000 как логарифм цены
    pub struct StubPredictor {
        pub calls: AtomicUsize,
    }

    impl StubPredictor {
        pub fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Predictor for StubPredictor {
        fn predict(&self, records: &RecordSet) -> Result<Array1<f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let idx = records.column_index("LotArea").unwrap_or(0);
            Ok(records
                .rows
                .iter()
                .map(|row| row[idx].as_number().unwrap_or(0.0) / 1000.0)
                .collect())
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    struct FailingPredictor;

    impl Predictor for FailingPredictor {
        fn predict(&self, _records: &RecordSet) -> Result<Array1<f64>> {
            Err(PredictionError::Schema("unseen category 'XX'".to_string()))
        }
    }

    struct ShortPredictor;

    impl Predictor for ShortPredictor {
        fn predict(&self, _records: &RecordSet) -> Result<Array1<f64>> {
            Ok(Array1::zeros(1))
        }
    }

    fn records(areas: &[f64]) -> RecordSet {
        RecordSet::from_rows(
            vec!["LotArea".to_string()],
            areas.iter().map(|a| vec![CellValue::Number(*a)]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_real_values_are_exp_of_transformed() {
        let adapter = InferenceAdapter::new(Arc::new(StubPredictor::new()), TargetTransform::Log);

        let predictions = adapter.infer(&records(&[12_000.0, 11_500.0])).unwrap();

        assert_eq!(predictions.transformed, vec![12.0, 11.5]);
        for (t, r) in predictions.transformed.iter().zip(&predictions.real) {
            assert!((r - t.exp()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_identity_transform() {
        let adapter =
            InferenceAdapter::new(Arc::new(StubPredictor::new()), TargetTransform::Identity);
        let predictions = adapter.infer(&records(&[5_000.0])).unwrap();
        assert_eq!(predictions.real, vec![5.0]);
    }

    #[test]
    fn test_empty_batch_skips_predictor() {
        let stub = Arc::new(StubPredictor::new());
        let adapter = InferenceAdapter::new(stub.clone(), TargetTransform::Log);

        let predictions = adapter.infer(&records(&[])).unwrap();

        assert!(predictions.is_empty());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_predictor_failure_becomes_inference_error() {
        let adapter = InferenceAdapter::new(Arc::new(FailingPredictor), TargetTransform::Log);
        let err = adapter.infer(&records(&[1.0])).unwrap_err();
        assert_eq!(err.kind(), "inference");
        assert!(err.to_string().contains("unseen category"));
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let adapter = InferenceAdapter::new(Arc::new(ShortPredictor), TargetTransform::Log);
        let err = adapter.infer(&records(&[1.0, 2.0])).unwrap_err();
        assert!(matches!(err, PredictionError::Inference(_)));
    }

    #[test]
    fn test_overflowing_exp_is_rejected() {
        let adapter = InferenceAdapter::new(Arc::new(StubPredictor::new()), TargetTransform::Log);
        let err = adapter.infer(&records(&[1_000_000.0])).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
    }
}
