//! Postgres-backed repository for task and upload rows.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use slidecast_core::{SourceType, TaskStatus, TaskType};
use slidecast_state::KeyValue;

use crate::error::{DataError, DataResult};
use crate::models::{TaskListFilter, TaskRow, TaskStatistics, UploadRow};

/// TTL for cached reads.
const CACHE_TTL: Duration = Duration::from_secs(300);
/// Prefix invalidated on every mutation.
const CACHE_PREFIX: &str = "cache:tasks:";

const INSERT_UPLOAD_SQL: &str = r"
    INSERT INTO uploads (
        id, user_id, filename, file_ext, source_type, content_type,
        checksum, size_bytes, storage_uri, created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
    ON CONFLICT (id) DO UPDATE
    SET updated_at = EXCLUDED.updated_at
";

const SELECT_UPLOAD_SQL: &str = r"
    SELECT id, user_id, filename, file_ext, source_type, content_type,
           checksum, size_bytes, storage_uri, created_at, updated_at
    FROM uploads
    WHERE id = $1
";

const DELETE_UPLOAD_SQL: &str = r"
    DELETE FROM uploads
    WHERE id = $1
";

const INSERT_TASK_SQL: &str = r"
    INSERT INTO tasks (
        id, upload_id, task_type, status, kwargs,
        voice_language, subtitle_language, created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
";

const UPDATE_TASK_SQL: &str = r"
    UPDATE tasks
    SET status = $2, error = $3, updated_at = $4
    WHERE id = $1
";

const DELETE_TASK_SQL: &str = r"
    DELETE FROM tasks
    WHERE id = $1
";

const TASK_COLUMNS: &str = r"
    t.id, t.upload_id, t.task_type, t.status, t.kwargs,
    t.voice_language, t.subtitle_language, t.error,
    t.created_at, t.updated_at,
    u.user_id AS user_id, u.filename AS filename, u.file_ext AS file_ext
";

const COUNT_TASKS_FOR_UPLOAD_SQL: &str = r"
    SELECT COUNT(*) AS count
    FROM tasks
    WHERE upload_id = $1
";

/// Repository over the task and upload tables, with an optional short-TTL
/// read cache on the key/value substrate.
#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
    cache: Option<Arc<dyn KeyValue>>,
}

impl TaskRepository {
    /// Initialise the repository, applying pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail or the database is unreachable.
    pub async fn new(pool: PgPool) -> DataResult<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool, cache: None })
    }

    /// Attach the read cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn KeyValue>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Access the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert (or refresh) an upload row. Conflicting ids are expected:
    /// identical content always hashes to the same id.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub async fn insert_upload(&self, upload: &UploadRow) -> DataResult<()> {
        sqlx::query(INSERT_UPLOAD_SQL)
            .bind(&upload.id)
            .bind(upload.user_id.as_deref())
            .bind(&upload.filename)
            .bind(&upload.file_ext)
            .bind(upload.source_type.as_str())
            .bind(upload.content_type.as_deref())
            .bind(&upload.checksum)
            .bind(upload.size_bytes)
            .bind(&upload.storage_uri)
            .bind(upload.created_at)
            .execute(&self.pool)
            .await?;
        self.invalidate_cache().await;
        Ok(())
    }

    /// Load an upload row.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails or the row is malformed.
    pub async fn get_upload(&self, upload_id: &str) -> DataResult<Option<UploadRow>> {
        let Some(row) = sqlx::query(SELECT_UPLOAD_SQL)
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(map_upload_row(&row)?))
    }

    /// Delete an upload row (cascades to its tasks).
    ///
    /// # Errors
    ///
    /// Returns an error when the delete fails.
    pub async fn delete_upload(&self, upload_id: &str) -> DataResult<bool> {
        let result = sqlx::query(DELETE_UPLOAD_SQL)
            .bind(upload_id)
            .execute(&self.pool)
            .await?;
        self.invalidate_cache().await;
        Ok(result.rows_affected() > 0)
    }

    /// Insert a task row.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub async fn insert_task(
        &self,
        task_id: Uuid,
        upload_id: &str,
        task_type: TaskType,
        kwargs: &serde_json::Value,
        voice_language: Option<&str>,
        subtitle_language: Option<&str>,
    ) -> DataResult<()> {
        sqlx::query(INSERT_TASK_SQL)
            .bind(task_id)
            .bind(upload_id)
            .bind(task_type.as_str())
            .bind(TaskStatus::Queued.as_str())
            .bind(Json(kwargs))
            .bind(voice_language)
            .bind(subtitle_language)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        self.invalidate_cache().await;
        Ok(())
    }

    /// Load a task row joined with its upload metadata.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails or the row is malformed.
    pub async fn get_task(&self, task_id: Uuid) -> DataResult<Option<TaskRow>> {
        let cache_key = format!("{CACHE_PREFIX}get:{task_id}");
        if let Some(cached) = self.cache_get::<Option<TaskRow>>(&cache_key).await {
            return Ok(cached);
        }
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t JOIN uploads u ON u.id = t.upload_id WHERE t.id = $1"
        );
        let row = sqlx::query(&sql)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        let task = row.as_ref().map(map_task_row).transpose()?;
        self.cache_put(&cache_key, &task).await;
        Ok(task)
    }

    /// Update a task row's status and error message.
    ///
    /// # Errors
    ///
    /// Returns an error when the update fails.
    pub async fn update_task(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        error: Option<&str>,
    ) -> DataResult<bool> {
        let result = sqlx::query(UPDATE_TASK_SQL)
            .bind(task_id)
            .bind(status.as_str())
            .bind(error)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        self.invalidate_cache().await;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a task row.
    ///
    /// # Errors
    ///
    /// Returns an error when the delete fails.
    pub async fn delete_task(&self, task_id: Uuid) -> DataResult<bool> {
        let result = sqlx::query(DELETE_TASK_SQL)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        self.invalidate_cache().await;
        Ok(result.rows_affected() > 0)
    }

    /// List task rows with pagination and optional filters, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails or a row is malformed.
    pub async fn list_tasks(&self, filter: &TaskListFilter) -> DataResult<Vec<TaskRow>> {
        let cache_key = format!(
            "{CACHE_PREFIX}list:{}:{}:{}:{}:{}",
            filter.limit,
            filter.offset,
            filter.status.map_or("any", TaskStatus::as_str),
            filter.user_id.as_deref().unwrap_or("any"),
            filter.upload_id.as_deref().unwrap_or("any"),
        );
        if let Some(cached) = self.cache_get::<Vec<TaskRow>>(&cache_key).await {
            return Ok(cached);
        }

        let mut builder = sqlx::QueryBuilder::new(format!(
            "SELECT {TASK_COLUMNS} FROM tasks t JOIN uploads u ON u.id = t.upload_id WHERE 1 = 1"
        ));
        if let Some(status) = filter.status {
            builder.push(" AND t.status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(user_id) = &filter.user_id {
            builder.push(" AND u.user_id = ");
            builder.push_bind(user_id);
        }
        if let Some(upload_id) = &filter.upload_id {
            builder.push(" AND t.upload_id = ");
            builder.push_bind(upload_id);
        }
        builder.push(" ORDER BY t.created_at DESC LIMIT ");
        builder.push_bind(filter.limit.max(0));
        builder.push(" OFFSET ");
        builder.push_bind(filter.offset.max(0));

        let rows = builder.build().fetch_all(&self.pool).await?;
        let tasks = rows
            .iter()
            .map(map_task_row)
            .collect::<DataResult<Vec<_>>>()?;
        self.cache_put(&cache_key, &tasks).await;
        Ok(tasks)
    }

    /// Every task belonging to an upload, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails or a row is malformed.
    pub async fn get_tasks_by_upload_id(&self, upload_id: &str) -> DataResult<Vec<TaskRow>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t JOIN uploads u ON u.id = t.upload_id \
             WHERE t.upload_id = $1 ORDER BY t.created_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(upload_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_task_row).collect()
    }

    /// Number of task rows referencing an upload.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn count_tasks_for_upload(&self, upload_id: &str) -> DataResult<i64> {
        let row = sqlx::query(COUNT_TASKS_FOR_UPLOAD_SQL)
            .bind(upload_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }

    /// Per-status task counts, optionally scoped to one owner.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn get_statistics(&self, user_id: Option<&str>) -> DataResult<TaskStatistics> {
        let cache_key = format!(
            "{CACHE_PREFIX}stats:{}",
            user_id.unwrap_or("any")
        );
        if let Some(cached) = self.cache_get::<TaskStatistics>(&cache_key).await {
            return Ok(cached);
        }

        let mut builder = sqlx::QueryBuilder::new(
            "SELECT t.status AS status, COUNT(*) AS count FROM tasks t \
             JOIN uploads u ON u.id = t.upload_id WHERE 1 = 1",
        );
        if let Some(user_id) = user_id {
            builder.push(" AND u.user_id = ");
            builder.push_bind(user_id);
        }
        builder.push(" GROUP BY t.status");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut stats = TaskStatistics::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            stats.absorb(TaskStatus::normalize(&status), count);
        }
        self.cache_put(&cache_key, &stats).await;
        Ok(stats)
    }

    async fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(error) => {
                debug!(key = %key, error = %error, "cache read failed; falling through");
                None
            }
        }
    }

    async fn cache_put<T: Serialize>(&self, key: &str, value: &T) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let Ok(payload) = serde_json::to_string(value) else {
            return;
        };
        if let Err(error) = cache.set(key, &payload, Some(CACHE_TTL)).await {
            debug!(key = %key, error = %error, "cache write failed; ignoring");
        }
    }

    async fn invalidate_cache(&self) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        match cache.scan_prefix(CACHE_PREFIX).await {
            Ok(keys) => {
                for key in keys {
                    if let Err(error) = cache.delete(&key).await {
                        debug!(key = %key, error = %error, "cache invalidation failed; ignoring");
                    }
                }
            }
            Err(error) => debug!(error = %error, "cache scan failed; ignoring"),
        }
    }
}

fn map_upload_row(row: &PgRow) -> DataResult<UploadRow> {
    let source_type: String = row.try_get("source_type")?;
    Ok(UploadRow {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        filename: row.try_get("filename")?,
        file_ext: row.try_get("file_ext")?,
        source_type: SourceType::from_str(&source_type).map_err(|_| DataError::Invalid {
            column: "source_type",
            value: source_type,
        })?,
        content_type: row.try_get("content_type")?,
        checksum: row.try_get("checksum")?,
        size_bytes: row.try_get("size_bytes")?,
        storage_uri: row.try_get("storage_uri")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_task_row(row: &PgRow) -> DataResult<TaskRow> {
    let task_type: String = row.try_get("task_type")?;
    let status: String = row.try_get("status")?;
    let Json(kwargs) = row.try_get::<Json<serde_json::Value>, _>("kwargs")?;
    Ok(TaskRow {
        id: row.try_get("id")?,
        upload_id: row.try_get("upload_id")?,
        task_type: TaskType::from_str(&task_type).map_err(|_| DataError::Invalid {
            column: "task_type",
            value: task_type,
        })?,
        status: TaskStatus::normalize(&status),
        kwargs,
        voice_language: row.try_get("voice_language")?,
        subtitle_language: row.try_get("subtitle_language")?,
        error: row.try_get("error")?,
        user_id: row.try_get("user_id")?,
        filename: row.try_get("filename")?,
        file_ext: row.try_get("file_ext")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
