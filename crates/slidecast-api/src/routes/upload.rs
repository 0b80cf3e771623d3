//! Upload and rerun endpoints.

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde_json::{Map, Value};
use tracing::info;

use slidecast_storage::paths::upload_object_key;

use crate::auth::CurrentUser;
use crate::dto::{SubmitOptions, SubmitResponse};
use crate::error::{ApiError, ApiResult};
use crate::service::{persist_upload, submit_task, StoredUpload};
use crate::state::ApiState;

/// Upload size cap (200 MiB), matching the ingest contract.
const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Extensions accepted for processing.
const ACCEPTED_EXTENSIONS: &[&str] = &[".pdf", ".ppt", ".pptx", ".key"];

/// `POST /api/upload` - store the document, create the upload row, and
/// queue the initial task.
pub async fn upload(
    State(api): State<ApiState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename = String::new();
    let mut content_type: Option<String> = None;
    let mut options = Map::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::InvalidInput(format!("malformed multipart body: {error}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            filename = field.file_name().unwrap_or("upload.bin").to_string();
            content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|error| ApiError::InvalidInput(format!("unreadable upload: {error}")))?;
            if bytes.len() > MAX_UPLOAD_BYTES {
                return Err(ApiError::InvalidInput("upload exceeds size limit".to_string()));
            }
            file_bytes = Some(bytes.to_vec());
        } else {
            let text = field
                .text()
                .await
                .map_err(|error| ApiError::InvalidInput(format!("unreadable field: {error}")))?;
            options.insert(name, coerce_field(&text));
        }
    }

    let content = file_bytes
        .ok_or_else(|| ApiError::InvalidInput("missing `file` field".to_string()))?;
    if content.is_empty() {
        return Err(ApiError::InvalidInput("uploaded file is empty".to_string()));
    }
    let extension = format!(
        ".{}",
        std::path::Path::new(&filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase()
    );
    if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ApiError::InvalidInput(format!(
            "unsupported file extension `{extension}`"
        )));
    }

    let submit_options: SubmitOptions = serde_json::from_value(Value::Object(options))
        .map_err(|error| ApiError::InvalidInput(format!("invalid options: {error}")))?;
    let knobs = submit_options.into_knobs();

    let stored = persist_upload(&api, &filename, &content, content_type.as_deref(), &user.user_id)
        .await?;
    let task_id = submit_task(&api, &stored, knobs, &user.user_id).await?;
    info!(file_id = %stored.file_id, task_id = %task_id, "upload accepted");
    Ok(Json(SubmitResponse {
        file_id: stored.file_id,
        task_id,
    }))
}

/// Multipart form fields arrive as strings; booleans need coercion before
/// they reach the typed options payload.
fn coerce_field(text: &str) -> Value {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

/// `POST /api/files/{file_id}/run` - queue a new task over an existing
/// upload, possibly with different knobs.
pub async fn run_again(
    State(api): State<ApiState>,
    user: CurrentUser,
    Path(file_id): Path<String>,
    Json(options): Json<SubmitOptions>,
) -> ApiResult<Json<SubmitResponse>> {
    let stored = resolve_upload_for_rerun(&api, &file_id, &user.user_id).await?;
    let knobs = options.into_knobs();
    let task_id = submit_task(&api, &stored, knobs, &user.user_id).await?;
    info!(file_id = %file_id, task_id = %task_id, "rerun accepted");
    Ok(Json(SubmitResponse { file_id, task_id }))
}

async fn resolve_upload_for_rerun(
    api: &ApiState,
    file_id: &str,
    user_id: &str,
) -> ApiResult<StoredUpload> {
    let (filename, file_ext, source_type) = if let Some(repo) = api.repo.as_ref() {
        let row = repo.get_upload(file_id).await?.ok_or(ApiError::NotFound)?;
        if row.user_id.as_deref() != Some(user_id) {
            return Err(ApiError::NotFound);
        }
        (row.filename, row.file_ext, row.source_type)
    } else {
        let state = api
            .state
            .get_state(file_id)
            .await?
            .ok_or(ApiError::NotFound)?;
        if state.user_id.as_deref() != Some(user_id) {
            return Err(ApiError::NotFound);
        }
        let file_ext = state.file_ext.clone().ok_or(ApiError::NotFound)?;
        (
            state.filename.clone().unwrap_or_else(|| file_id.to_string()),
            file_ext,
            state.source_type,
        )
    };

    // Restore the local working copy from storage when it has been cleaned.
    let local_path = api.uploads_dir.join(format!("{file_id}{file_ext}"));
    if !tokio::fs::try_exists(&local_path).await.unwrap_or(false) {
        let object_key = upload_object_key(file_id, &file_ext);
        api.storage.get_file(&object_key, &local_path).await?;
    }

    Ok(StoredUpload {
        file_id: file_id.to_string(),
        file_path: local_path.display().to_string(),
        file_ext,
        filename,
        source_type,
    })
}
