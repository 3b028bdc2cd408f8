/// Сводная статистика по ценам

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionStats {
    pub total: usize,
    /// `None`, если предсказаний нет
    pub average: Option<f64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl PredictionStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                total: 0,
                average: None,
                minimum: None,
                maximum: None,
            };
        }

        let sum: f64 = values.iter().sum();
        Self {
            total: values.len(),
            average: Some(sum / values.len() as f64),
            minimum: Some(values.iter().copied().fold(f64::INFINITY, f64::min)),
            maximum: Some(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        }
    }
}

/// "$208,500.00"; пустая статистика печатается как "$0.00"
pub fn format_currency(value: Option<f64>) -> String {
    let value = value.unwrap_or(0.0);
    let cents = (value.abs() * 100.0).round() as u128;
    let whole = (cents / 100).to_string();
    let fraction = cents % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, fraction)
}
