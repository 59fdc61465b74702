use chrono::{DateTime, Utc};
use exam_core::model::{Percentage, ResultRecord};
use sqlx::Row;

use super::SqliteRepository;
use crate::repository::{ResultRecordId, ResultRecordRepository, ResultRecordRow, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn score_to_hundredths(score: f64) -> Result<i64, StorageError> {
    Percentage::from_percent(score)
        .map(|p| i64::from(p.hundredths()))
        .ok_or_else(|| StorageError::Serialization(format!("invalid score: {score}")))
}

fn score_from_hundredths(v: i64) -> Result<f64, StorageError> {
    u32::try_from(v)
        .ok()
        .and_then(Percentage::from_hundredths)
        .map(Percentage::as_f64)
        .ok_or_else(|| StorageError::Serialization(format!("invalid score_hundredths: {v}")))
}

fn map_record_row(row: &sqlx::sqlite::SqliteRow) -> Result<ResultRecord, StorageError> {
    let name: String = row.try_get("name").map_err(ser)?;
    let id: Option<String> = row.try_get("candidate_id").map_err(ser)?;
    let score = score_from_hundredths(row.try_get::<i64, _>("score_hundredths").map_err(ser)?)?;
    let passed: bool = row.try_get("passed").map_err(ser)?;
    let date: DateTime<Utc> = row.try_get("recorded_at").map_err(ser)?;

    Ok(ResultRecord {
        name,
        id,
        score,
        passed,
        date,
    })
}

#[async_trait::async_trait]
impl ResultRecordRepository for SqliteRepository {
    async fn append_record(&self, record: &ResultRecord) -> Result<ResultRecordId, StorageError> {
        let score = score_to_hundredths(record.score)?;

        let res = sqlx::query(
            r"
                INSERT INTO result_records (
                    name, candidate_id, score_hundredths, passed, recorded_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(&record.name)
        .bind(record.id.as_deref())
        .bind(score)
        .bind(record.passed)
        .bind(record.date)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(res.last_insert_rowid())
    }

    async fn get_record(&self, id: ResultRecordId) -> Result<ResultRecord, StorageError> {
        let row = sqlx::query(
            r"
                SELECT name, candidate_id, score_hundredths, passed, recorded_at
                FROM result_records
                WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        map_record_row(&row)
    }

    async fn list_records(&self, limit: u32) -> Result<Vec<ResultRecordRow>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, name, candidate_id, score_hundredths, passed, recorded_at
                FROM result_records
                ORDER BY recorded_at DESC, id DESC
                LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").map_err(ser)?;
            out.push(ResultRecordRow::new(id, map_record_row(&row)?));
        }
        Ok(out)
    }
}
