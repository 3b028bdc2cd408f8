//! Ошибки конвейера предсказаний

use thiserror::Error;

/// Ошибки, которые видит вызывающая сторона.
///
/// Каждый вариант имеет стабильный `kind()`, чтобы клиенты и тесты могли
/// отличать плохой ввод от сбоя модели и от отсутствующего результата.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionError {
    /// В запросе нет файла
    #[error("No file provided")]
    MissingFile,

    /// В загруженном файле нет обязательных колонок
    #[error("Missing required columns: {}", missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    /// Файл не читается как CSV
    #[error("Malformed upload: {0}")]
    Schema(String),

    /// Тело запроса больше лимита загрузки
    #[error("Upload too large: {0}")]
    UploadTooLarge(String),

    /// Превышен лимит строк на один запрос
    #[error("Too many rows: {rows} (limit {limit})")]
    TooManyRows { rows: usize, limit: usize },

    /// Сбой модели на батче
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Предсказание не уложилось во время
    #[error("Inference timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// Нет результата для скачивания
    #[error("No results available: {0}")]
    NoResultAvailable(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid pipeline artifact: {0}")]
    Artifact(String),
}

impl PredictionError {
    /// Машиночитаемый тип ошибки
    pub fn kind(&self) -> &'static str {
        match self {
            PredictionError::MissingFile => "missing_file",
            PredictionError::MissingColumns { .. } => "missing_columns",
            PredictionError::Schema(_) => "schema",
            PredictionError::UploadTooLarge(_) => "upload_too_large",
            PredictionError::TooManyRows { .. } => "too_many_rows",
            PredictionError::Inference(_) => "inference",
            PredictionError::Timeout { .. } => "timeout",
            PredictionError::NoResultAvailable(_) => "no_result_available",
            PredictionError::Config(_) => "config",
            PredictionError::Artifact(_) => "artifact",
        }
    }

    /// Ошибка входных данных (а не модели или сервера)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PredictionError::MissingFile
                | PredictionError::MissingColumns { .. }
                | PredictionError::Schema(_)
                | PredictionError::UploadTooLarge(_)
                | PredictionError::TooManyRows { .. }
                | PredictionError::NoResultAvailable(_)
        )
    }
}

impl From<csv::Error> for PredictionError {
    fn from(err: csv::Error) -> Self {
        PredictionError::Schema(err.to_string())
    }
}

impl From<config::ConfigError> for PredictionError {
    fn from(err: config::ConfigError) -> Self {
        PredictionError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PredictionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_names_columns() {
        let err = PredictionError::MissingColumns {
            missing: vec!["LotArea".to_string(), "YrSold".to_string()],
        };
        assert_eq!(err.to_string(), "Missing required columns: LotArea, YrSold");
        assert_eq!(err.kind(), "missing_columns");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_inference_is_not_client_error() {
        let err = PredictionError::Inference("unseen category".to_string());
        assert_eq!(err.kind(), "inference");
        assert!(!err.is_client_error());
        assert!(!PredictionError::Timeout { millis: 10 }.is_client_error());
    }
}
