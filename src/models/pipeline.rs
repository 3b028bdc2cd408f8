//! Обученный конвейер цен, загружаемый из JSON-артефакта
//!
//! Артефакт описывает упорядоченные шаги подготовки признаков, обученные
//! офлайн, и линейную модель поверх них. Здесь ничего не обучается.

#![allow(non_snake_case)]

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PredictionError, Result};
use crate::models::predictor::{Predictor, TargetTransform};
use crate::types::{CellValue, RecordSet};

fn default_missing_label() -> String {
    "Missing".to_string()
}

fn default_rare_label() -> String {
    "Rare".to_string()
}

/// Шаг подготовки признаков с обученными параметрами
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineStep {
    /// Пропуск в категории -> отдельная категория
    MissingCategoryImputer {
        variables: Vec<String>,
        #[serde(default = "default_missing_label")]
        fill_value: String,
    },
    /// Пропуск в категории -> самая частая категория
    FrequentCategoryImputer { fill_values: BTreeMap<String, String> },
    /// Пропуск в числе -> обученное значение, опционально с индикатором `<var>_na`
    NumericImputer {
        fill_values: BTreeMap<String, f64>,
        #[serde(default)]
        add_indicator: bool,
    },
    /// `var = reference - var` (например, лет с момента ремонта)
    ElapsedTime {
        variables: Vec<String>,
        reference: String,
    },
    DropFeatures { variables: Vec<String> },
    LogTransform { variables: Vec<String> },
    /// Редкие категории сворачиваются в одну
    RareLabelEncoder {
        frequent_labels: BTreeMap<String, Vec<String>>,
        #[serde(default = "default_rare_label")]
        replace_with: String,
    },
    OrdinalEncoder {
        mappings: BTreeMap<String, BTreeMap<String, f64>>,
    },
    MinMaxScaler {
        min: BTreeMap<String, f64>,
        max: BTreeMap<String, f64>,
    },
}

impl PipelineStep {
    fn name(&self) -> &'static str {
        match self {
            PipelineStep::MissingCategoryImputer { .. } => "missing_category_imputer",
            PipelineStep::FrequentCategoryImputer { .. } => "frequent_category_imputer",
            PipelineStep::NumericImputer { .. } => "numeric_imputer",
            PipelineStep::ElapsedTime { .. } => "elapsed_time",
            PipelineStep::DropFeatures { .. } => "drop_features",
            PipelineStep::LogTransform { .. } => "log_transform",
            PipelineStep::RareLabelEncoder { .. } => "rare_label_encoder",
            PipelineStep::OrdinalEncoder { .. } => "ordinal_encoder",
            PipelineStep::MinMaxScaler { .. } => "min_max_scaler",
        }
    }

    fn apply(&self, frame: &mut RecordSet) -> Result<()> {
        match self {
            PipelineStep::MissingCategoryImputer {
                variables,
                fill_value,
            } => {
                for var in variables {
                    map_column(frame, var, |_, cell| {
                        Ok(match cell.into_categorical() {
                            CellValue::Missing => CellValue::Text(fill_value.clone()),
                            other => other,
                        })
                    })?;
                }
            }
            PipelineStep::FrequentCategoryImputer { fill_values } => {
                for (var, fill) in fill_values {
                    map_column(frame, var, |_, cell| {
                        Ok(match cell.into_categorical() {
                            CellValue::Missing => CellValue::Text(fill.clone()),
                            other => other,
                        })
                    })?;
                }
            }
            PipelineStep::NumericImputer {
                fill_values,
                add_indicator,
            } => {
                for (var, fill) in fill_values {
                    if *add_indicator {
                        let idx = column(frame, var)?;
                        let flags: Vec<f64> = frame
                            .rows
                            .iter()
                            .map(|row| if row[idx].is_missing() { 1.0 } else { 0.0 })
                            .collect();
                        frame.push_numeric_column(&format!("{}_na", var), &flags)?;
                    }
                    map_column(frame, var, |_, cell| {
                        Ok(match cell {
                            CellValue::Missing => CellValue::Number(*fill),
                            other => other,
                        })
                    })?;
                }
            }
            PipelineStep::ElapsedTime {
                variables,
                reference,
            } => {
                let ref_idx = column(frame, reference)?;
                for var in variables {
                    let idx = column(frame, var)?;
                    for (i, row) in frame.rows.iter_mut().enumerate() {
                        let reference_value = numeric(&row[ref_idx], reference, i)?;
                        let value = numeric(&row[idx], var, i)?;
                        row[idx] = CellValue::Number(reference_value - value);
                    }
                }
            }
            PipelineStep::DropFeatures { variables } => {
                for var in variables {
                    let idx = column(frame, var)?;
                    frame.columns.remove(idx);
                    for row in frame.rows.iter_mut() {
                        row.remove(idx);
                    }
                }
            }
            PipelineStep::LogTransform { variables } => {
                for var in variables {
                    map_column(frame, var, |i, cell| {
                        let value = numeric(&cell, var, i)?;
                        if value <= 0.0 {
                            return Err(PredictionError::Inference(format!(
                                "{} must be positive for log transform, got {} at row {}",
                                var,
                                value,
                                i + 1
                            )));
                        }
                        Ok(CellValue::Number(value.ln()))
                    })?;
                }
            }
            PipelineStep::RareLabelEncoder {
                frequent_labels,
                replace_with,
            } => {
                for (var, labels) in frequent_labels {
                    let frequent: HashSet<&str> = labels.iter().map(String::as_str).collect();
                    map_column(frame, var, |_, cell| {
                        Ok(match cell.into_categorical() {
                            CellValue::Text(s) if !frequent.contains(s.as_str()) => {
                                CellValue::Text(replace_with.clone())
                            }
                            other => other,
                        })
                    })?;
                }
            }
            PipelineStep::OrdinalEncoder { mappings } => {
                for (var, mapping) in mappings {
                    map_column(frame, var, |i, cell| match cell.into_categorical() {
                        CellValue::Text(s) => mapping
                            .get(&s)
                            .map(|code| CellValue::Number(*code))
                            .ok_or_else(|| {
                                PredictionError::Inference(format!(
                                    "unseen category '{}' in {} at row {}",
                                    s,
                                    var,
                                    i + 1
                                ))
                            }),
                        _ => Err(PredictionError::Inference(format!(
                            "missing value in {} at row {}",
                            var,
                            i + 1
                        ))),
                    })?;
                }
            }
            PipelineStep::MinMaxScaler { min, max } => {
                for (var, lo) in min {
                    let hi = max.get(var).copied().unwrap_or(*lo);
                    let range = hi - lo;
                    map_column(frame, var, |i, cell| {
                        let value = numeric(&cell, var, i)?;
                        let scaled = if range.abs() < 1e-12 {
                            0.0
                        } else {
                            (value - lo) / range
                        };
                        Ok(CellValue::Number(scaled))
                    })?;
                }
            }
        }
        Ok(())
    }
}

fn column(frame: &RecordSet, name: &str) -> Result<usize> {
    frame
        .column_index(name)
        .ok_or_else(|| PredictionError::Inference(format!("column {} not found", name)))
}

fn numeric(cell: &CellValue, var: &str, row: usize) -> Result<f64> {
    match cell {
        CellValue::Number(v) => Ok(*v),
        CellValue::Text(s) => Err(PredictionError::Inference(format!(
            "non-numeric value '{}' in {} at row {}",
            s,
            var,
            row + 1
        ))),
        CellValue::Missing => Err(PredictionError::Inference(format!(
            "missing value in {} at row {}",
            var,
            row + 1
        ))),
    }
}

fn map_column<F>(frame: &mut RecordSet, name: &str, mut f: F) -> Result<()>
where
    F: FnMut(usize, CellValue) -> Result<CellValue>,
{
    let idx = column(frame, name)?;
    for (i, row) in frame.rows.iter_mut().enumerate() {
        let cell = std::mem::replace(&mut row[idx], CellValue::Missing);
        row[idx] = f(i, cell)?;
    }
    Ok(())
}

/// Линейная регрессия на подготовленных признаках
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub features: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegressor {
    fn predict(&self, frame: &RecordSet) -> Result<Array1<f64>> {
        let indices = self
            .features
            .iter()
            .map(|name| column(frame, name))
            .collect::<Result<Vec<_>>>()?;

        let mut X = Array2::zeros((frame.len(), self.features.len()));
        for (i, row) in frame.rows.iter().enumerate() {
            for (j, &idx) in indices.iter().enumerate() {
                X[[i, j]] = numeric(&row[idx], &self.features[j], i)?;
            }
        }

        let weights = Array1::from(self.coefficients.clone());
        Ok(X.dot(&weights) + self.intercept)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineArtifact {
    pub name: String,
    /// Шкала цели при обучении, если известна
    #[serde(default)]
    pub target_transform: Option<TargetTransform>,
    pub steps: Vec<PipelineStep>,
    pub regressor: LinearRegressor,
}

impl PipelineArtifact {
    pub fn validate(&self) -> Result<()> {
        if self.regressor.features.len() != self.regressor.coefficients.len() {
            return Err(PredictionError::Artifact(format!(
                "regressor has {} features but {} coefficients",
                self.regressor.features.len(),
                self.regressor.coefficients.len()
            )));
        }
        for step in &self.steps {
            if let PipelineStep::MinMaxScaler { min, max } = step {
                if min.keys().ne(max.keys()) {
                    return Err(PredictionError::Artifact(
                        "min_max_scaler min/max name different variables".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Конвейер цен на дома
pub struct PricePipeline {
    artifact: PipelineArtifact,
}

impl PricePipeline {
    pub fn from_artifact(artifact: PipelineArtifact) -> Result<Self> {
        artifact.validate()?;
        Ok(Self { artifact })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: PipelineArtifact =
            serde_json::from_str(json).map_err(|e| PredictionError::Artifact(e.to_string()))?;
        Self::from_artifact(artifact)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PredictionError::Artifact(format!("cannot read {}: {}", path.display(), e))
        })?;
        let pipeline = Self::from_json(&json)?;
        info!(
            "Loaded pipeline '{}' from {} ({} steps, {} model features)",
            pipeline.artifact.name,
            path.display(),
            pipeline.artifact.steps.len(),
            pipeline.artifact.regressor.features.len()
        );
        Ok(pipeline)
    }

    pub fn target_transform(&self) -> Option<TargetTransform> {
        self.artifact.target_transform
    }

    /// Проверка, что артефакт обучен на той же шкале, что настроена в адаптере
    pub fn check_target_transform(&self, configured: TargetTransform) -> Result<()> {
        match self.artifact.target_transform {
            Some(declared) if declared != configured => Err(PredictionError::Config(format!(
                "pipeline '{}' was trained with target transform '{}' but '{}' is configured",
                self.artifact.name,
                declared.as_str(),
                configured.as_str()
            ))),
            _ => Ok(()),
        }
    }
}

impl Predictor for PricePipeline {
    fn predict(&self, records: &RecordSet) -> Result<Array1<f64>> {
        let mut frame = records.clone();
        for step in &self.artifact.steps {
            step.apply(&mut frame).map_err(|e| match e {
                PredictionError::Inference(msg) => {
                    PredictionError::Inference(format!("{}: {}", step.name(), msg))
                }
                other => other,
            })?;
        }
        self.artifact.regressor.predict(&frame)
    }

    fn name(&self) -> &str {
        &self.artifact.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIFACT: &str = r#"{
        "name": "test",
        "target_transform": "log",
        "steps": [
            {"type": "missing_category_imputer", "variables": ["FireplaceQu"]},
            {"type": "numeric_imputer", "fill_values": {"LotFrontage": 70.0}, "add_indicator": true},
            {"type": "elapsed_time", "variables": ["YearRemodAdd"], "reference": "YrSold"},
            {"type": "drop_features", "variables": ["YrSold"]},
            {"type": "log_transform", "variables": ["LotArea"]},
            {"type": "rare_label_encoder", "frequent_labels": {"MSSubClass": ["20", "60"]}},
            {"type": "ordinal_encoder", "mappings": {
                "MSSubClass": {"20": 0.0, "60": 1.0, "Rare": 2.0},
                "FireplaceQu": {"Missing": 0.0, "TA": 3.0, "Gd": 4.0}
            }},
            {"type": "min_max_scaler", "min": {"LotFrontage": 20.0}, "max": {"LotFrontage": 120.0}}
        ],
        "regressor": {
            "features": ["MSSubClass", "LotFrontage", "LotFrontage_na", "LotArea", "YearRemodAdd", "FireplaceQu"],
            "coefficients": [0.1, 0.5, -0.05, 0.2, -0.01, 0.02],
            "intercept": 10.0
        }
    }"#;

    fn records(rows: Vec<Vec<CellValue>>) -> RecordSet {
        RecordSet::from_rows(
            ["MSSubClass", "LotFrontage", "LotArea", "YearRemodAdd", "FireplaceQu", "YrSold"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rows,
        )
        .unwrap()
    }

    fn row(sub: &str, frontage: CellValue, area: f64, fire: CellValue) -> Vec<CellValue> {
        vec![
            CellValue::Text(sub.to_string()),
            frontage,
            CellValue::Number(area),
            CellValue::Number(2003.0),
            fire,
            CellValue::Number(2008.0),
        ]
    }

    #[test]
    fn test_predict_applies_steps_in_order() {
        let pipeline = PricePipeline::from_json(ARTIFACT).unwrap();
        let input = records(vec![row(
            "60",
            CellValue::Number(70.0),
            std::f64::consts::E,
            CellValue::Text("Gd".to_string()),
        )]);

        let output = pipeline.predict(&input).unwrap();

        // 10 + 0.1*1 + 0.5*0.5 + 0 + 0.2*1 - 0.01*5 + 0.02*4
        let expected = 10.0 + 0.1 + 0.25 + 0.2 - 0.05 + 0.08;
        assert_eq!(output.len(), 1);
        assert!((output[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_imputation_and_rare_labels() {
        let pipeline = PricePipeline::from_json(ARTIFACT).unwrap();
        let input = records(vec![row(
            "190",
            CellValue::Missing,
            1.0,
            CellValue::Missing,
        )]);

        let output = pipeline.predict(&input).unwrap();

        // Rare=2, LotFrontage imputed 70 -> 0.5, indicator 1, ln(1)=0, Missing=0
        let expected = 10.0 + 0.2 + 0.25 - 0.05 + 0.0 - 0.05 + 0.0;
        assert!((output[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_unseen_category_fails_whole_batch() {
        let pipeline = PricePipeline::from_json(ARTIFACT).unwrap();
        let input = records(vec![
            row("20", CellValue::Number(60.0), 9000.0, CellValue::Text("TA".to_string())),
            row("20", CellValue::Number(60.0), 9000.0, CellValue::Text("Ex".to_string())),
        ]);

        let err = pipeline.predict(&input).unwrap_err();

        assert_eq!(err.kind(), "inference");
        assert!(err.to_string().contains("unseen category 'Ex' in FireplaceQu"));
    }

    #[test]
    fn test_non_positive_log_input_fails() {
        let pipeline = PricePipeline::from_json(ARTIFACT).unwrap();
        let input = records(vec![row("20", CellValue::Number(60.0), 0.0, CellValue::Missing)]);
        let err = pipeline.predict(&input).unwrap_err();
        assert!(err.to_string().contains("log_transform"));
    }

    #[test]
    fn test_text_in_numeric_feature_fails() {
        let pipeline = PricePipeline::from_json(ARTIFACT).unwrap();
        let input = records(vec![row(
            "20",
            CellValue::Text("wide".to_string()),
            9000.0,
            CellValue::Missing,
        )]);
        let err = pipeline.predict(&input).unwrap_err();
        assert!(err.to_string().contains("non-numeric value 'wide'"));
    }

    #[test]
    fn test_coefficient_count_mismatch_rejected() {
        let json = ARTIFACT.replace("[0.1, 0.5, -0.05, 0.2, -0.01, 0.02]", "[0.1]");
        let err = PricePipeline::from_json(&json).err().unwrap();
        assert_eq!(err.kind(), "artifact");
    }

    #[test]
    fn test_target_transform_must_match_configuration() {
        let pipeline = PricePipeline::from_json(ARTIFACT).unwrap();
        assert!(pipeline.check_target_transform(TargetTransform::Log).is_ok());
        let err = pipeline
            .check_target_transform(TargetTransform::Identity)
            .unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_bundled_artifact_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/artifacts/precio_casas_pipeline.json");
        let pipeline = PricePipeline::load(path).unwrap();
        assert_eq!(pipeline.target_transform(), Some(TargetTransform::Log));
    }
}
