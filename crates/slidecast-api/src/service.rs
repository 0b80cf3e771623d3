//! Task submission and ownership resolution shared by the route handlers.

use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use slidecast_core::{SourceType, TaskKnobs};
use slidecast_data::UploadRow;
use slidecast_queue::TaskPayload;
use slidecast_state::CreateState;
use slidecast_storage::paths::{normalize_extension, upload_object_key};

use crate::dto::TaskView;
use crate::error::{ApiError, ApiResult};
use crate::state::ApiState;

/// Derive the upload id from content bytes: the first sixteen hex
/// characters of the SHA-256 digest. Identical bytes always map to the same
/// upload.
#[must_use]
pub fn upload_id_for(content: &[u8]) -> (String, String) {
    let digest = Sha256::digest(content);
    let checksum: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    (checksum[..16].to_string(), checksum)
}

/// Persisted upload details handed to task submission.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Content-derived upload id.
    pub file_id: String,
    /// Local path of the stored source.
    pub file_path: String,
    /// Normalized extension including the dot.
    pub file_ext: String,
    /// Original filename.
    pub filename: String,
    /// Kind of source document.
    pub source_type: SourceType,
}

/// Store the uploaded bytes (local copy + storage object) and upsert the
/// upload row. Re-uploading identical bytes reuses the existing object and
/// row.
///
/// # Errors
///
/// Returns an error when storage or the repository fails.
pub async fn persist_upload(
    api: &ApiState,
    filename: &str,
    content: &[u8],
    content_type: Option<&str>,
    user_id: &str,
) -> ApiResult<StoredUpload> {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(normalize_extension)
        .unwrap_or_default();
    if extension.is_empty() {
        return Err(ApiError::InvalidInput(
            "uploaded file has no extension".to_string(),
        ));
    }

    let (file_id, checksum) = upload_id_for(content);
    let object_key = upload_object_key(&file_id, &extension);

    let local_path = api.uploads_dir.join(format!("{file_id}{extension}"));
    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|error| ApiError::internal(format!("uploads dir: {error}")))?;
    }
    tokio::fs::write(&local_path, content)
        .await
        .map_err(|error| ApiError::internal(format!("upload write: {error}")))?;

    // Identical content is already stored under the same key; skip the write.
    let storage_uri = if api.storage.exists(&object_key).await? {
        api.storage.uri_for(&object_key)
    } else {
        api.storage
            .put_bytes(
                content,
                &object_key,
                content_type.unwrap_or("application/octet-stream"),
            )
            .await?
    };

    let source_type = SourceType::from_extension(&extension);
    if let Some(repo) = api.repo.as_ref() {
        repo.insert_upload(&UploadRow {
            id: file_id.clone(),
            user_id: Some(user_id.to_string()),
            filename: filename.to_string(),
            file_ext: extension.clone(),
            source_type,
            content_type: content_type.map(str::to_string),
            checksum,
            size_bytes: content.len() as i64,
            storage_uri,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        })
        .await?;
    }

    info!(file_id = %file_id, filename, "upload persisted");
    Ok(StoredUpload {
        file_id,
        file_path: local_path.display().to_string(),
        file_ext: extension,
        filename: filename.to_string(),
        source_type,
    })
}

/// Create the task row, materialize task-scoped state, and enqueue the
/// task. Returns the new task id.
///
/// # Errors
///
/// Returns an error when the queue or state store fails; row insertion is
/// best effort.
pub async fn submit_task(
    api: &ApiState,
    upload: &StoredUpload,
    knobs: TaskKnobs,
    user_id: &str,
) -> ApiResult<Uuid> {
    let task_id = Uuid::new_v4();
    let task_type = knobs.task_type();

    if let Some(repo) = api.repo.as_ref() {
        let kwargs = serde_json::to_value(&knobs)
            .map_err(|error| ApiError::internal(format!("kwargs encode: {error}")))?;
        if let Err(error) = repo
            .insert_task(
                task_id,
                &upload.file_id,
                task_type,
                &kwargs,
                Some(knobs.voice_language.as_str()),
                knobs.subtitle_language.as_deref(),
            )
            .await
        {
            warn!(task_id = %task_id, error = %error, "task row insert failed; continuing");
        }
    }

    api.state
        .create_state(CreateState {
            file_id: upload.file_id.clone(),
            file_path: Some(upload.file_path.clone()),
            file_ext: upload.file_ext.clone(),
            filename: Some(upload.filename.clone()),
            source_type: upload.source_type,
            task_type,
            knobs: knobs.clone(),
            plan_options: api.plan_options,
            task_id: Some(task_id),
            user_id: Some(user_id.to_string()),
            bind_task: true,
        })
        .await?;

    api.queue
        .submit_with_id(
            task_id,
            task_type,
            TaskPayload {
                file_id: upload.file_id.clone(),
                file_path: Some(upload.file_path.clone()),
                file_ext: Some(upload.file_ext.clone()),
                filename: Some(upload.filename.clone()),
                source_type: Some(upload.source_type),
                knobs,
                purge: None,
            },
            Some(user_id.to_string()),
        )
        .await?;
    Ok(task_id)
}

/// Resolve a task and enforce ownership: missing tasks and foreign tasks
/// are both 404.
///
/// # Errors
///
/// Returns [`ApiError::NotFound`] for missing or foreign tasks.
pub async fn resolve_owned_task(
    api: &ApiState,
    task_id: Uuid,
    user_id: &str,
) -> ApiResult<TaskView> {
    if let Some(repo) = api.repo.as_ref() {
        let row = repo.get_task(task_id).await?.ok_or(ApiError::NotFound)?;
        if row.user_id.as_deref() != Some(user_id) {
            return Err(ApiError::NotFound);
        }
        return Ok(TaskView::from_row(&row));
    }

    // Standalone mode: the queue record carries ownership.
    let record = api
        .queue
        .get_task(task_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if record.user_id.as_deref() != Some(user_id) {
        return Err(ApiError::NotFound);
    }
    Ok(TaskView::from_record(&record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_ids_are_stable_sha256_prefixes() {
        let (id_a, checksum_a) = upload_id_for(b"identical bytes");
        let (id_b, checksum_b) = upload_id_for(b"identical bytes");
        assert_eq!(id_a, id_b);
        assert_eq!(checksum_a, checksum_b);
        assert_eq!(id_a.len(), 16);
        assert_eq!(checksum_a.len(), 64);
        assert!(id_a.chars().all(|c| c.is_ascii_hexdigit()));

        let (id_c, _) = upload_id_for(b"different bytes");
        assert_ne!(id_a, id_c);
    }
}
