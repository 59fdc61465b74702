use std::sync::Arc;

use chrono::{DateTime, Utc};

use exam_core::model::{Percentage, ResultRecord};
use storage::repository::{ResultRecordId, ResultRecordRepository, ResultRecordRow, StorageError};

use crate::error::HistoryError;

/// One stored attempt, ready for listing.
///
/// Carries raw values only; the caller decides how to format them.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryItem {
    pub id: ResultRecordId,
    pub name: String,
    pub candidate_id: Option<String>,
    pub score: Percentage,
    pub passed: bool,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryItem {
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored score is not a
    /// percentage between 0 and 100.
    pub fn from_row(row: &ResultRecordRow) -> Result<Self, StorageError> {
        let ResultRecord {
            name,
            id,
            score,
            passed,
            date,
        } = &row.record;
        let score = Percentage::from_percent(*score).ok_or_else(|| {
            StorageError::Serialization(format!("invalid score for record {}: {score}", row.id))
        })?;
        Ok(Self {
            id: row.id,
            name: name.clone(),
            candidate_id: id.clone(),
            score,
            passed: *passed,
            recorded_at: *date,
        })
    }
}

/// Read side of the result store.
#[derive(Clone)]
pub struct HistoryService {
    results: Arc<dyn ResultRecordRepository>,
}

impl HistoryService {
    #[must_use]
    pub fn new(results: Arc<dyn ResultRecordRepository>) -> Self {
        Self { results }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(storage::repository::InMemoryRepository::new()))
    }

    /// Most recent attempts first, at most `limit` of them.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Storage` on repository failures.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<HistoryItem>, HistoryError> {
        let rows = self.results.list_records(limit).await?;
        let items = rows
            .iter()
            .map(HistoryItem::from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Fetch one stored attempt.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Storage` when the record is missing or the
    /// repository fails.
    pub async fn get(&self, id: ResultRecordId) -> Result<HistoryItem, HistoryError> {
        let record = self.results.get_record(id).await?;
        Ok(HistoryItem::from_row(&ResultRecordRow::new(id, record))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn record(name: &str, score: f64, minutes: i64) -> ResultRecord {
        ResultRecord {
            name: name.to_string(),
            id: None,
            score,
            passed: score >= 75.0,
            date: fixed_now() + chrono::Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn list_recent_returns_newest_first() {
        let repo = InMemoryRepository::new();
        repo.append_record(&record("Ada", 50.0, 0)).await.unwrap();
        repo.append_record(&record("Bea", 87.5, 5)).await.unwrap();

        let svc = HistoryService::new(Arc::new(repo));
        let items = svc.list_recent(10).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Bea");
        assert_eq!(items[0].score.to_string(), "87.50");
        assert!(items[0].passed);
        assert_eq!(items[1].name, "Ada");
        assert!(!items[1].passed);
    }

    #[tokio::test]
    async fn out_of_range_stored_score_is_reported() {
        let repo = InMemoryRepository::new();
        repo.append_record(&record("Ada", 50.0, 0)).await.unwrap();
        let id = repo.append_record(&record("Bea", 250.0, 5)).await.unwrap();

        let svc = HistoryService::new(Arc::new(repo));
        let err = svc.list_recent(10).await.unwrap_err();
        assert!(matches!(
            err,
            HistoryError::Storage(StorageError::Serialization(_))
        ));

        let err = svc.get(id).await.unwrap_err();
        assert!(matches!(
            err,
            HistoryError::Storage(StorageError::Serialization(ref msg)) if msg.contains("250")
        ));
        assert_eq!(svc.get(1).await.unwrap().score.to_string(), "50.00");
    }

    #[tokio::test]
    async fn get_missing_is_storage_error() {
        let svc = HistoryService::in_memory();
        let err = svc.get(7).await.unwrap_err();
        assert!(matches!(err, HistoryError::Storage(StorageError::NotFound)));
    }
}
