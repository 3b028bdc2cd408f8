//! Конфигурация: набор признаков модели и настройки сервиса

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{PredictionError, Result};
use crate::models::TargetTransform;

/// Колонка, которая выглядит числовой, но модель обучена на ней как на категории
pub const CATEGORICAL_CODED_COLUMN: &str = "MSSubClass";

/// Переменная окружения с путем к дополнительному файлу настроек
pub const CONFIG_PATH_ENV: &str = "HOUSE_PRICE_CONFIG";

/// Признаки, на которых обучен конвейер.
///
/// Должны совпадать с тем, как конвейер был обучен; во время работы не меняются.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Обязательные колонки в порядке, который ожидает конвейер
    pub features: Vec<String>,
    /// Категории с пропусками, заполняемыми модой
    pub categorical_vars_with_na_frequent: Vec<String>,
    /// Категории с пропусками, заполняемыми категорией "Missing"
    pub categorical_vars_with_na_missing: Vec<String>,
    /// Числовые признаки с пропусками
    pub numerical_vars_with_na: Vec<String>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            features: owned(&[
                "MSSubClass",
                "MSZoning",
                "LotFrontage",
                "LotArea",
                "LotShape",
                "LandContour",
                "LotConfig",
                "Neighborhood",
                "OverallQual",
                "OverallCond",
                "YearRemodAdd",
                "RoofStyle",
                "Exterior1st",
                "ExterQual",
                "Foundation",
                "BsmtQual",
                "BsmtExposure",
                "BsmtFinType1",
                "HeatingQC",
                "CentralAir",
                "1stFlrSF",
                "2ndFlrSF",
                "GrLivArea",
                "BsmtFullBath",
                "HalfBath",
                "KitchenQual",
                "TotRmsAbvGrd",
                "Functional",
                "Fireplaces",
                "FireplaceQu",
                "GarageFinish",
                "GarageCars",
                "GarageArea",
                "PavedDrive",
                "WoodDeckSF",
                "ScreenPorch",
                "SaleCondition",
                // нужен только для вычисления возраста ремонта
                "YrSold",
            ]),
            categorical_vars_with_na_frequent: owned(&[
                "BsmtQual",
                "BsmtExposure",
                "BsmtFinType1",
                "GarageFinish",
            ]),
            categorical_vars_with_na_missing: owned(&["FireplaceQu"]),
            numerical_vars_with_na: owned(&["LotFrontage"]),
        }
    }
}

impl FeatureConfig {
    /// Колонки, где пропуски ожидаемы и обрабатываются внутри конвейера
    pub fn expected_na_columns(&self) -> HashSet<&str> {
        self.categorical_vars_with_na_frequent
            .iter()
            .chain(&self.categorical_vars_with_na_missing)
            .chain(&self.numerical_vars_with_na)
            .map(String::as_str)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.features.is_empty() {
            return Err(PredictionError::Config("feature list is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for name in &self.features {
            if !seen.insert(name.as_str()) {
                return Err(PredictionError::Config(format!(
                    "duplicate feature: {}",
                    name
                )));
            }
        }

        let mut unknown: Vec<&str> = self
            .expected_na_columns()
            .into_iter()
            .filter(|name| !seen.contains(name))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(PredictionError::Config(format!(
                "missing-value groups name columns outside the feature list: {}",
                unknown.join(", ")
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub address: SocketAddr,
    /// Максимальный размер загружаемого файла
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([0, 0, 0, 0], 5000)),
            max_upload_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub artifact_path: String,
    /// Преобразование целевой переменной при обучении
    pub target_transform: TargetTransform,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            artifact_path: "artifacts/precio_casas_pipeline.json".to_string(),
            target_transform: TargetTransform::Log,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub max_rows: usize,
    pub base_timeout_ms: u64,
    pub per_row_timeout_ms: u64,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            max_rows: 50_000,
            base_timeout_ms: 2_000,
            per_row_timeout_ms: 1,
        }
    }
}

impl InferenceSettings {
    /// Таймаут растет с размером батча
    pub fn timeout_for(&self, rows: usize) -> Duration {
        let per_row = self.per_row_timeout_ms.saturating_mul(rows as u64);
        Duration::from_millis(self.base_timeout_ms.saturating_add(per_row))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultSettings {
    pub ttl_secs: u64,
    pub capacity: usize,
    /// Сколько строк показывать на странице результатов
    pub preview_rows: usize,
}

impl Default for ResultSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 3_600,
            capacity: 256,
            preview_rows: 20,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub inference: InferenceSettings,
    pub results: ResultSettings,
    pub features: FeatureConfig,
}

impl AppConfig {
    /// Загрузка: config/default.toml, затем файл из HOUSE_PRICE_CONFIG,
    /// затем переменные окружения HOUSE_PRICE__SECTION__KEY
    pub fn load() -> Result<Self> {
        let mut builder =
            Config::builder().add_source(File::with_name("config/default").required(false));

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&path));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("HOUSE_PRICE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(settings)
    }

    pub fn from_config(settings: Config) -> Result<Self> {
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;
        if self.inference.max_rows == 0 {
            return Err(PredictionError::Config(
                "inference.max_rows must be positive".to_string(),
            ));
        }
        if self.results.capacity == 0 {
            return Err(PredictionError::Config(
                "results.capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_default_feature_config_is_consistent() {
        let features = FeatureConfig::default();
        features.validate().unwrap();
        assert!(features.features.contains(&CATEGORICAL_CODED_COLUMN.to_string()));
        assert!(features.expected_na_columns().contains("LotFrontage"));
        assert!(!features.expected_na_columns().contains("LotArea"));
    }

    #[test]
    fn test_validate_rejects_unknown_na_column() {
        let mut features = FeatureConfig::default();
        features.numerical_vars_with_na.push("PoolArea".to_string());
        let err = features.validate().unwrap_err();
        assert!(err.to_string().contains("PoolArea"));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut features = FeatureConfig::default();
        features.features.push("LotArea".to_string());
        assert!(matches!(features.validate(), Err(PredictionError::Config(_))));
    }

    #[test]
    fn test_timeout_scales_with_rows() {
        let settings = InferenceSettings::default();
        assert_eq!(settings.timeout_for(0), Duration::from_millis(2_000));
        assert_eq!(settings.timeout_for(1_000), Duration::from_millis(3_000));
    }

    #[test]
    fn test_from_toml_overrides_defaults() {
        let settings = Config::builder()
            .add_source(File::from_str(
                r#"
                [server]
                address = "127.0.0.1:8080"

                [model]
                target_transform = "identity"

                [results]
                preview_rows = 5
                "#,
                FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let config = AppConfig::from_config(settings).unwrap();
        assert_eq!(config.server.address.port(), 8080);
        assert_eq!(config.model.target_transform, TargetTransform::Identity);
        assert_eq!(config.results.preview_rows, 5);
        assert_eq!(config.results.ttl_secs, 3_600);
        assert_eq!(config.features, FeatureConfig::default());
    }

    #[test]
    fn test_from_toml_rejects_zero_capacity() {
        let settings = Config::builder()
            .add_source(File::from_str("[results]\ncapacity = 0", FileFormat::Toml))
            .build()
            .unwrap();
        assert!(AppConfig::from_config(settings).is_err());
    }
}
