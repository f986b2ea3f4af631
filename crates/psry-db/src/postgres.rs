//! PostgreSQL record store

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use psry_core::config::validate_table_name;
use psry_core::{FaceSummary, ProcessStage, ProcessingRecord, RecordId, StageUpdate};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{RecordStoreError, RecordStoreResult};
use crate::store::{RecordStore, RecordStream, DEFAULT_PAGE_SIZE};

const COLUMNS: &str =
    "id, file_name, url, process_stage, face_detection, image_text, translations, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: String,
    file_name: String,
    url: String,
    process_stage: ProcessStage,
    face_detection: Option<Json<Vec<FaceSummary>>>,
    image_text: Option<String>,
    translations: Option<Json<BTreeMap<String, String>>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RecordRow> for ProcessingRecord {
    fn from(row: RecordRow) -> Self {
        ProcessingRecord {
            id: RecordId::new(row.id),
            file_name: row.file_name,
            url: row.url,
            process_stage: row.process_stage,
            face_detection: row.face_detection.map(|Json(faces)| faces),
            image_text: row.image_text,
            translations: row.translations.map(|Json(map)| map),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Record store over one PostgreSQL table.
///
/// `process_stage` is an enum type whose declaration order is pipeline order, so
/// `GREATEST` and `>=` on it follow the stage state machine.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
    table: Arc<str>,
    page_size: i64,
}

impl PgRecordStore {
    /// The table name is interpolated into SQL and must be a plain identifier.
    pub fn new(pool: PgPool, table: &str) -> anyhow::Result<Self> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            table: Arc::from(table),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Create the stage enum and the record table if they do not exist.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            DO $$
            BEGIN
                CREATE TYPE process_stage AS ENUM
                    ('uploaded', 'face_detected', 'text_processed', 'text_translated');
            EXCEPTION
                WHEN duplicate_object THEN NULL;
            END
            $$
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create process_stage type")?;

        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                url TEXT NOT NULL,
                process_stage process_stage NOT NULL DEFAULT 'uploaded',
                face_detection JSONB,
                image_text TEXT,
                translations JSONB,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            table = self.table
        );
        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .context("Failed to create record table")?;

        tracing::info!(table = %self.table, "Record table ready");
        Ok(())
    }

    /// Tell a missing record apart from one that is not far enough along.
    async fn rejection(&self, id: &RecordId, requested: ProcessStage) -> RecordStoreError {
        let sql = format!("SELECT process_stage FROM {} WHERE id = $1", self.table);
        let current = sqlx::query_scalar::<Postgres, ProcessStage>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read record stage");

        match current {
            Ok(Some(current)) => RecordStoreError::StageConflict {
                id: id.clone(),
                current,
                requested,
            },
            Ok(None) => RecordStoreError::NotFound(id.clone()),
            Err(e) => RecordStoreError::Backend(e),
        }
    }
}

fn update_sql(table: &str, column: &str) -> String {
    format!(
        r#"
        UPDATE {table}
        SET {column} = $2,
            process_stage = GREATEST(process_stage, $3),
            updated_at = NOW()
        WHERE id = $1 AND process_stage >= $4
        RETURNING {COLUMNS}
        "#
    )
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn get(&self, id: &RecordId) -> RecordStoreResult<ProcessingRecord> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", COLUMNS, self.table);
        let row = sqlx::query_as::<Postgres, RecordRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get record")?;

        row.map(ProcessingRecord::from)
            .ok_or_else(|| RecordStoreError::NotFound(id.clone()))
    }

    async fn put(&self, record: &ProcessingRecord) -> RecordStoreResult<()> {
        let sql = format!(
            r#"
            INSERT INTO {table} ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                file_name = EXCLUDED.file_name,
                url = EXCLUDED.url,
                process_stage = EXCLUDED.process_stage,
                face_detection = EXCLUDED.face_detection,
                image_text = EXCLUDED.image_text,
                translations = EXCLUDED.translations,
                updated_at = EXCLUDED.updated_at
            "#,
            table = self.table
        );

        sqlx::query(&sql)
            .bind(record.id.as_str())
            .bind(&record.file_name)
            .bind(&record.url)
            .bind(record.process_stage)
            .bind(record.face_detection.as_ref().map(Json))
            .bind(record.image_text.as_deref())
            .bind(record.translations.as_ref().map(Json))
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .context("Failed to put record")?;

        tracing::debug!(record_id = %record.id, stage = %record.process_stage, "Record stored");
        Ok(())
    }

    async fn update(
        &self,
        id: &RecordId,
        update: StageUpdate,
    ) -> RecordStoreResult<ProcessingRecord> {
        let requested = update.target_stage();
        let Some(predecessor) = requested.predecessor() else {
            return Err(RecordStoreError::StageConflict {
                id: id.clone(),
                current: requested,
                requested,
            });
        };

        let row = match &update {
            StageUpdate::FaceDetected(faces) => {
                let sql = update_sql(&self.table, "face_detection");
                sqlx::query_as::<Postgres, RecordRow>(&sql)
                    .bind(id.as_str())
                    .bind(Json(faces))
                    .bind(requested)
                    .bind(predecessor)
                    .fetch_optional(&self.pool)
                    .await
            }
            StageUpdate::TextProcessed(text) => {
                let sql = update_sql(&self.table, "image_text");
                sqlx::query_as::<Postgres, RecordRow>(&sql)
                    .bind(id.as_str())
                    .bind(text)
                    .bind(requested)
                    .bind(predecessor)
                    .fetch_optional(&self.pool)
                    .await
            }
            StageUpdate::TextTranslated(translations) => {
                let sql = update_sql(&self.table, "translations");
                sqlx::query_as::<Postgres, RecordRow>(&sql)
                    .bind(id.as_str())
                    .bind(Json(translations))
                    .bind(requested)
                    .bind(predecessor)
                    .fetch_optional(&self.pool)
                    .await
            }
        }
        .context("Failed to update record")?;

        match row {
            Some(row) => {
                let record = ProcessingRecord::from(row);
                tracing::debug!(
                    record_id = %id,
                    stage = %record.process_stage,
                    "Record stage updated"
                );
                Ok(record)
            }
            None => Err(self.rejection(id, requested).await),
        }
    }

    fn scan_all(&self) -> RecordStream {
        let pool = self.pool.clone();
        let sql_first = format!("SELECT {} FROM {} ORDER BY id LIMIT $1", COLUMNS, self.table);
        let sql_next = format!(
            "SELECT {} FROM {} WHERE id > $2 ORDER BY id LIMIT $1",
            COLUMNS, self.table
        );
        let page_size = self.page_size;

        stream::try_unfold(Some(None::<String>), move |cursor| {
            let pool = pool.clone();
            let sql_first = sql_first.clone();
            let sql_next = sql_next.clone();
            async move {
                let Some(after) = cursor else {
                    return Ok(None);
                };

                let rows = match &after {
                    None => {
                        sqlx::query_as::<Postgres, RecordRow>(&sql_first)
                            .bind(page_size)
                            .fetch_all(&pool)
                            .await
                    }
                    Some(last_id) => {
                        sqlx::query_as::<Postgres, RecordRow>(&sql_next)
                            .bind(page_size)
                            .bind(last_id)
                            .fetch_all(&pool)
                            .await
                    }
                }
                .context("Failed to scan records")?;

                if rows.is_empty() {
                    return Ok(None);
                }

                let next = if (rows.len() as i64) < page_size {
                    None
                } else {
                    rows.last().map(|row| Some(row.id.clone()))
                };
                let page: Vec<ProcessingRecord> =
                    rows.into_iter().map(ProcessingRecord::from).collect();
                Ok::<_, RecordStoreError>(Some((page, next)))
            }
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    async fn ping(&self) -> RecordStoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Record store ping failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_sql_guards_on_predecessor_and_keeps_max_stage() {
        let sql = update_sql("processing_records", "image_text");
        assert!(sql.contains("SET image_text = $2"));
        assert!(sql.contains("GREATEST(process_stage, $3)"));
        assert!(sql.contains("process_stage >= $4"));
    }

    #[tokio::test]
    async fn rejects_unsafe_table_names() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/psry")
            .unwrap();
        assert!(PgRecordStore::new(pool.clone(), "processing_records").is_ok());
        assert!(PgRecordStore::new(pool, "records;drop").is_err());
    }
}
