//! Приведение загруженных данных к контракту признаков конвейера

use tracing::{debug, warn};

use crate::config::{FeatureConfig, CATEGORICAL_CODED_COLUMN};
use crate::error::{PredictionError, Result};
use crate::types::{CellValue, RecordSet, IDENTIFIER_COLUMN};

/// Результат нормализации с учетом отброшенных строк
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    /// Ровно колонки FEATURES в порядке FEATURES
    pub records: RecordSet,
    pub rows_received: usize,
    pub rows_dropped: usize,
    /// Колонки вне групп с ожидаемыми пропусками, в которых нашлись пропуски
    pub unexpected_missing: Vec<String>,
}

pub struct SchemaNormalizer;

impl SchemaNormalizer {
    /// Чистая функция: сырые строки -> строки, готовые для конвейера
    pub fn normalize(raw: &RecordSet, config: &FeatureConfig) -> Result<NormalizedBatch> {
        let rows_received = raw.len();

        // 1. Идентификатор никогда не является признаком
        let mut records = match raw.column_index(IDENTIFIER_COLUMN) {
            Some(idx) => drop_column(raw, idx),
            None => raw.clone(),
        };

        // 2. MSSubClass приходит числом, но конвейер обучен на нем как на категории.
        // Это именованное исключение, а не общее правило.
        if let Some(idx) = records.column_index(CATEGORICAL_CODED_COLUMN) {
            for row in records.rows.iter_mut() {
                let cell = std::mem::replace(&mut row[idx], CellValue::Missing);
                row[idx] = cell.into_categorical();
            }
        }

        // 3. Ровно FEATURES в порядке FEATURES
        let missing: Vec<String> = config
            .features
            .iter()
            .filter(|name| !records.has_column(name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            warn!("Upload rejected, missing columns: {:?}", missing);
            return Err(PredictionError::MissingColumns { missing });
        }
        let records = select_columns(&records, &config.features);

        // 4. Пропуски там, где конвейер их не ожидает
        let expected_na = config.expected_na_columns();
        let unexpected_missing: Vec<(usize, String)> = config
            .features
            .iter()
            .enumerate()
            .filter(|(_, name)| !expected_na.contains(name.as_str()))
            .filter(|(idx, _)| records.rows.iter().any(|row| row[*idx].is_missing()))
            .map(|(idx, name)| (idx, name.clone()))
            .collect();

        // 5. Такие строки отбрасываются целиком
        let columns = records.columns;
        let rows: Vec<Vec<CellValue>> = records
            .rows
            .into_iter()
            .filter(|row| unexpected_missing.iter().all(|(idx, _)| !row[*idx].is_missing()))
            .collect();

        let rows_dropped = rows_received - rows.len();
        if rows_dropped > 0 {
            warn!(
                "Dropped {} of {} rows with missing values in {:?}",
                rows_dropped,
                rows_received,
                unexpected_missing.iter().map(|(_, n)| n).collect::<Vec<_>>()
            );
        }
        debug!("Normalized batch: {} rows kept", rows.len());

        Ok(NormalizedBatch {
            records: RecordSet { columns, rows },
            rows_received,
            rows_dropped,
            unexpected_missing: unexpected_missing.into_iter().map(|(_, n)| n).collect(),
        })
    }
}

fn drop_column(records: &RecordSet, idx: usize) -> RecordSet {
    let mut columns = records.columns.clone();
    columns.remove(idx);
    let rows = records
        .rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row.remove(idx);
            row
        })
        .collect();
    RecordSet { columns, rows }
}

/// Все колонки из `names` должны существовать
fn select_columns(records: &RecordSet, names: &[String]) -> RecordSet {
    let indices: Vec<usize> = names
        .iter()
        .filter_map(|name| records.column_index(name))
        .collect();
    let rows = records
        .rows
        .iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();
    RecordSet {
        columns: names.to_vec(),
        rows,
    }
}
