//! Stream record repository.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::database::models::{StreamRecordDbModel, StreamRecordWrite};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::domain::StreamRecord;
use crate::Result;

/// Stream record repository trait.
#[async_trait]
pub trait StreamRecordRepository: Send + Sync {
    /// Records belonging to any of the given subscriptions.
    async fn list_records(&self, subscription_ids: &[String]) -> Result<Vec<StreamRecord>>;

    /// Insert the record, or overwrite the mutable fields of the existing
    /// record of the same subscription.
    async fn upsert_record(&self, record: &StreamRecord) -> Result<()>;
}

/// SQLx implementation of StreamRecordRepository.
pub struct SqlxStreamRecordRepository {
    pool: SqlitePool,
}

impl SqlxStreamRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn upsert_once(&self, row: &StreamRecordWrite<'_>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stream_records (
                subscription_id, status, viewers, message_id,
                start_time, end_time, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(subscription_id) DO UPDATE SET
                status = excluded.status,
                viewers = excluded.viewers,
                message_id = excluded.message_id,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(row.subscription_id)
        .bind(row.status)
        .bind(row.viewers)
        .bind(row.message_id)
        .bind(row.start_time)
        .bind(row.end_time)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StreamRecordRepository for SqlxStreamRecordRepository {
    async fn list_records(&self, subscription_ids: &[String]) -> Result<Vec<StreamRecord>> {
        if subscription_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM stream_records WHERE subscription_id IN (");
        let mut separated = builder.separated(", ");
        for id in subscription_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows = builder
            .build_query_as::<StreamRecordDbModel>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(StreamRecordDbModel::into_record)
            .collect()
    }

    async fn upsert_record(&self, record: &StreamRecord) -> Result<()> {
        let row = StreamRecordWrite::from(record);
        retry_on_sqlite_busy("upsert_record", || self.upsert_once(&row)).await
    }
}
