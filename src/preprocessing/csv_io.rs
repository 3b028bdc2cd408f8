//! Чтение загруженных CSV и выгрузка результатов

use csv::{ReaderBuilder, Writer};
use tracing::debug;

use crate::error::{PredictionError, Result};
use crate::types::{CellValue, RecordSet};

/// Маркеры пропусков, как их понимают обычные dataframe-библиотеки
const MISSING_MARKERS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "<NA>", "#N/A",
];

fn is_missing_marker(field: &str) -> bool {
    MISSING_MARKERS.contains(&field.trim())
}

/// Разбор CSV с заголовком.
///
/// Тип определяется по колонке: если все непустые значения парсятся как
/// числа, колонка числовая, иначе все значения остаются текстом.
pub fn read_csv(bytes: &[u8]) -> Result<RecordSet> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(bytes);

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if columns.is_empty() || columns.iter().all(String::is_empty) {
        return Err(PredictionError::Schema("missing header row".to_string()));
    }

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        raw_rows.push(record.iter().map(str::to_string).collect());
    }

    let numeric_columns: Vec<bool> = (0..columns.len())
        .map(|col| {
            raw_rows
                .iter()
                .map(|row| row[col].as_str())
                .filter(|field| !is_missing_marker(field))
                .all(|field| field.trim().parse::<f64>().is_ok())
        })
        .collect();

    let rows = raw_rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&numeric_columns)
                .map(|(field, &numeric)| parse_cell(field, numeric))
                .collect()
        })
        .collect();

    debug!(
        "Parsed CSV: {} columns, {} numeric",
        columns.len(),
        numeric_columns.iter().filter(|n| **n).count()
    );

    RecordSet::from_rows(columns, rows)
}

fn parse_cell(field: String, numeric: bool) -> CellValue {
    if is_missing_marker(&field) {
        return CellValue::Missing;
    }
    if numeric {
        // f64 парсит "NAN", "inf", "Infinity" в любом регистре
        match field.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => return CellValue::Number(value),
            Ok(_) => return CellValue::Missing,
            Err(_) => {}
        }
    }
    CellValue::Text(field)
}

/// Запись набора строк в CSV (заголовок + строки)
pub fn write_csv(records: &RecordSet) -> Result<Vec<u8>> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(&records.columns)?;
    for row in &records.rows {
        writer.write_record(row.iter().map(CellValue::to_field))?;
    }
    writer
        .into_inner()
        .map_err(|e| PredictionError::Schema(format!("failed to flush CSV: {}", e)))
}
