/// Типы данных для сервиса предсказаний

use serde::{Deserialize, Serialize};

use crate::error::{PredictionError, Result};

/// Колонка с предсказанием в шкале модели (логарифм цены)
pub const TRANSFORMED_COLUMN: &str = "Prediccion_Escalada";
/// Колонка с предсказанием в долларах
pub const REAL_UNIT_COLUMN: &str = "Precio_Predicho_USD";
/// Колонка-идентификатор, которая никогда не является признаком
pub const IDENTIFIER_COLUMN: &str = "Id";

/// Значение одной ячейки таблицы
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Missing,
}

impl CellValue {
    /// NaN в числовой ячейке тоже считается пропуском
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Missing => true,
            CellValue::Number(v) => v.is_nan(),
            CellValue::Text(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Категориальное представление: числа становятся строками
    pub fn into_categorical(self) -> CellValue {
        match self {
            CellValue::Number(v) => CellValue::Text(format_number(v)),
            other => other,
        }
    }

    /// Текст ячейки для CSV и HTML
    pub fn to_field(&self) -> String {
        match self {
            CellValue::Number(v) => format_number(*v),
            CellValue::Text(s) => s.clone(),
            CellValue::Missing => String::new(),
        }
    }
}

/// Целые значения печатаются без дробной части (60, а не 60.0)
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Упорядоченный набор строк с именованными колонками
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RecordSet {
    /// Создание с проверкой длины каждой строки
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self> {
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(PredictionError::Schema(format!(
                "row {} has {} fields, expected {}",
                i + 1,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Добавить числовую колонку в конец
    pub fn push_numeric_column(&mut self, name: &str, values: &[f64]) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(PredictionError::Inference(format!(
                "column {} has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(CellValue::Number(*value));
        }
        Ok(())
    }

    /// Первые `n` строк с теми же колонками
    pub fn head(&self, n: usize) -> RecordSet {
        RecordSet {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }
}

/// Ответ JSON API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiPredictionResponse {
    pub predicciones: Vec<f64>,
    pub total: usize,
    pub descartados: usize,
    pub promedio: Option<f64>,
    pub minimo: Option<f64>,
    pub maximo: Option<f64>,
}

/// Структурированная ошибка API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
}

impl From<&PredictionError> for ErrorResponse {
    fn from(err: &PredictionError) -> Self {
        let missing = match err {
            PredictionError::MissingColumns { missing } => Some(missing.clone()),
            _ => None,
        };
        Self {
            error: err.to_string(),
            kind: err.kind().to_string(),
            missing,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub features: usize,
    /// Результаты, доступные для скачивания
    pub stored_results: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(60.0), "60");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(12.25), "12.25");
    }

    #[test]
    fn test_into_categorical() {
        assert_eq!(
            CellValue::Number(60.0).into_categorical(),
            CellValue::Text("60".to_string())
        );
        assert_eq!(CellValue::Missing.into_categorical(), CellValue::Missing);
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        let result = RecordSet::from_rows(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![CellValue::Number(1.0)]],
        );
        assert!(matches!(result, Err(PredictionError::Schema(_))));
    }

    #[test]
    fn test_push_numeric_column_length_mismatch() {
        let mut records = RecordSet::from_rows(
            vec!["a".to_string()],
            vec![vec![CellValue::Number(1.0)], vec![CellValue::Number(2.0)]],
        )
        .unwrap();
        assert!(records.push_numeric_column("p", &[1.0]).is_err());
        records.push_numeric_column("p", &[1.0, 2.0]).unwrap();
        assert_eq!(records.columns, vec!["a", "p"]);
        assert_eq!(records.rows[1][1], CellValue::Number(2.0));
    }

    #[test]
    fn test_error_response_carries_missing_columns() {
        let err = PredictionError::MissingColumns {
            missing: vec!["LotArea".to_string()],
        };
        let body = ErrorResponse::from(&err);
        assert_eq!(body.kind, "missing_columns");
        assert_eq!(body.missing, Some(vec!["LotArea".to_string()]));
    }
}
