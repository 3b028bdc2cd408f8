//! Хранилище результатов для последующего скачивания
//!
//! Каждый результат доступен только по своему токену; общего "последнего
//! результата" нет, поэтому параллельные запросы не видят чужие данные.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{PredictionError, Result};
use crate::models::PredictionStats;
use crate::types::RecordSet;

/// Токен, возвращаемый вызывающей стороне
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultToken(pub Uuid);

impl ResultToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Result<Self> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|_| PredictionError::NoResultAvailable(format!("invalid token '{}'", value)))
    }
}

impl Default for ResultToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ResultToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Полный результат одного запуска
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResult {
    /// Признаки после нормализации + две колонки предсказаний
    pub table: RecordSet,
    pub stats: PredictionStats,
    pub rows_dropped: usize,
    pub created_at: DateTime<Utc>,
}

pub struct ResultStore {
    entries: RwLock<HashMap<ResultToken, StoredResult>>,
    ttl: Duration,
    capacity: usize,
}

impl ResultStore {
    pub fn new(ttl_secs: u64, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs.min(u32::MAX as u64) as i64),
            capacity: capacity.max(1),
        }
    }

    pub async fn insert(
        &self,
        table: RecordSet,
        stats: PredictionStats,
        rows_dropped: usize,
    ) -> ResultToken {
        self.insert_at(table, stats, rows_dropped, Utc::now()).await
    }

    pub async fn get(&self, token: &ResultToken) -> Result<StoredResult> {
        self.get_at(token, Utc::now()).await
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn insert_at(
        &self,
        table: RecordSet,
        stats: PredictionStats,
        rows_dropped: usize,
        now: DateTime<Utc>,
    ) -> ResultToken {
        let mut entries = self.entries.write().await;

        let ttl = self.ttl;
        entries.retain(|_, entry| now - entry.created_at < ttl);

        while entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(token, _)| *token);
            match oldest {
                Some(token) => {
                    debug!("Evicting result {}", token);
                    entries.remove(&token);
                }
                None => break,
            }
        }

        let token = ResultToken::new();
        entries.insert(
            token,
            StoredResult {
                table,
                stats,
                rows_dropped,
                created_at: now,
            },
        );
        token
    }

    async fn get_at(&self, token: &ResultToken, now: DateTime<Utc>) -> Result<StoredResult> {
        let entries = self.entries.read().await;
        match entries.get(token) {
            Some(entry) if now - entry.created_at < self.ttl => Ok(entry.clone()),
            Some(_) => Err(PredictionError::NoResultAvailable(format!(
                "result {} has expired",
                token
            ))),
            None => Err(PredictionError::NoResultAvailable(format!(
                "unknown result {}",
                token
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellValue;

    fn table(value: f64) -> RecordSet {
        RecordSet::from_rows(
            vec!["Precio_Predicho_USD".to_string()],
            vec![vec![CellValue::Number(value)]],
        )
        .unwrap()
    }

    fn stats() -> PredictionStats {
        PredictionStats::from_values(&[1.0])
    }

    #[tokio::test]
    async fn test_results_are_isolated_by_token() {
        let store = ResultStore::new(60, 10);

        let first = store.insert(table(1.0), stats(), 0).await;
        let second = store.insert(table(2.0), stats(), 1).await;

        assert_ne!(first, second);
        assert_eq!(store.get(&first).await.unwrap().table, table(1.0));
        let other = store.get(&second).await.unwrap();
        assert_eq!(other.table, table(2.0));
        assert_eq!(other.rows_dropped, 1);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let store = ResultStore::new(60, 10);
        let err = store.get(&ResultToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), "no_result_available");
    }

    #[tokio::test]
    async fn test_expired_entries() {
        let store = ResultStore::new(60, 10);
        let start = Utc::now();

        let token = store.insert_at(table(1.0), stats(), 0, start).await;

        assert!(store.get_at(&token, start + Duration::seconds(30)).await.is_ok());
        let err = store
            .get_at(&token, start + Duration::seconds(61))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let store = ResultStore::new(3_600, 2);
        let start = Utc::now();

        let first = store.insert_at(table(1.0), stats(), 0, start).await;
        let second = store
            .insert_at(table(2.0), stats(), 0, start + Duration::seconds(1))
            .await;
        let third = store
            .insert_at(table(3.0), stats(), 0, start + Duration::seconds(2))
            .await;

        let now = start + Duration::seconds(3);
        assert!(store.get_at(&first, now).await.is_err());
        assert!(store.get_at(&second, now).await.is_ok());
        assert!(store.get_at(&third, now).await.is_ok());
        assert_eq!(store.len().await, 2);
    }

    #[test]
    fn test_parse_token() {
        let token = ResultToken::new();
        assert_eq!(ResultToken::parse(&token.to_string()).unwrap(), token);
        assert!(ResultToken::parse("temp_results.csv").is_err());
    }
}
