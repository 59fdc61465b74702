use async_trait::async_trait;
use exam_core::model::ResultRecord;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Storage identifier for a persisted result record.
///
/// NOTE: This is `i64` to match `SQLite` row IDs.
pub type ResultRecordId = i64;

/// A persisted result record together with its row id.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecordRow {
    pub id: ResultRecordId,
    pub record: ResultRecord,
}

impl ResultRecordRow {
    #[must_use]
    pub fn new(id: ResultRecordId, record: ResultRecord) -> Self {
        Self { id, record }
    }
}

/// Append-only history of graded attempts.
#[async_trait]
pub trait ResultRecordRepository: Send + Sync {
    /// Append a record and return its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn append_record(&self, record: &ResultRecord) -> Result<ResultRecordId, StorageError>;

    /// Fetch a record by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_record(&self, id: ResultRecordId) -> Result<ResultRecord, StorageError>;

    /// List up to `limit` records, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query or decoding failures.
    async fn list_records(&self, limit: u32) -> Result<Vec<ResultRecordRow>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    records: Arc<Mutex<Vec<ResultRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn row_id(index: usize) -> ResultRecordId {
    ResultRecordId::try_from(index + 1).unwrap_or(ResultRecordId::MAX)
}

#[async_trait]
impl ResultRecordRepository for InMemoryRepository {
    async fn append_record(&self, record: &ResultRecord) -> Result<ResultRecordId, StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.push(record.clone());
        Ok(row_id(guard.len() - 1))
    }

    async fn get_record(&self, id: ResultRecordId) -> Result<ResultRecord, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        usize::try_from(id)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|index| guard.get(index))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_records(&self, limit: u32) -> Result<Vec<ResultRecordRow>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(guard
            .iter()
            .enumerate()
            .rev()
            .take(limit)
            .map(|(index, record)| ResultRecordRow::new(row_id(index), record.clone()))
            .collect())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub results: Arc<dyn ResultRecordRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let results: Arc<dyn ResultRecordRepository> = Arc::new(InMemoryRepository::new());
        Self { results }
    }
}
