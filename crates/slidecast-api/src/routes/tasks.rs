//! Task lifecycle endpoints: listing, status, progress, retry, cancel,
//! delete.

use axum::extract::{Path, Query, State};
use axum::Json;
use tracing::{info, warn};
use uuid::Uuid;

use slidecast_core::{StepName, TaskStatus, TaskType};
use slidecast_data::{TaskListFilter, TaskStatistics};
use slidecast_pipeline::artifacts::collect_purge_targets;
use slidecast_queue::{PurgeRequest, TaskPayload};

use crate::auth::CurrentUser;
use crate::dto::{
    CancelResponse, DeleteResponse, ProgressResponse, RetryRequest, RetryResponse,
    TaskDetailResponse, TaskListQuery, TaskListResponse, TaskView,
};
use crate::error::{ApiError, ApiResult};
use crate::service::resolve_owned_task;
use crate::state::ApiState;

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 200;

/// `GET /api/tasks` - paged listing for the caller's tasks.
pub async fn list_tasks(
    State(api): State<ApiState>,
    user: CurrentUser,
    Query(query): Query<TaskListQuery>,
) -> ApiResult<Json<TaskListResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let offset = query.offset.unwrap_or(0).max(0);
    let status = query
        .status
        .as_deref()
        .map(TaskStatus::normalize);

    let tasks = match api.repo.as_ref() {
        Some(repo) => repo
            .list_tasks(&TaskListFilter {
                limit,
                offset,
                status,
                user_id: Some(user.user_id.clone()),
                upload_id: None,
            })
            .await?
            .iter()
            .map(TaskView::from_row)
            .collect(),
        None => Vec::new(),
    };
    Ok(Json(TaskListResponse {
        tasks,
        limit,
        offset,
    }))
}

/// `GET /api/tasks/statistics` - per-status counts for the caller.
pub async fn statistics(
    State(api): State<ApiState>,
    user: CurrentUser,
) -> ApiResult<Json<TaskStatistics>> {
    let stats = match api.repo.as_ref() {
        Some(repo) => repo.get_statistics(Some(&user.user_id)).await?,
        None => TaskStatistics::default(),
    };
    Ok(Json(stats))
}

/// `GET /api/tasks/{task_id}` and `/status` - the row view plus live state.
pub async fn get_task(
    State(api): State<ApiState>,
    user: CurrentUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskDetailResponse>> {
    let view = resolve_owned_task(&api, task_id, &user.user_id).await?;
    let progress = api
        .state
        .get_state_by_task(task_id)
        .await?
        .map(|state| ProgressResponse::from_state(task_id, &state));
    Ok(Json(TaskDetailResponse {
        task: view,
        progress,
    }))
}

/// `GET /api/tasks/{task_id}/progress` - the progress view.
pub async fn progress(
    State(api): State<ApiState>,
    user: CurrentUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<ProgressResponse>> {
    let view = resolve_owned_task(&api, task_id, &user.user_id).await?;
    let response = match api.state.get_state_by_task(task_id).await? {
        Some(state) => ProgressResponse::from_state(task_id, &state),
        // State has expired; synthesize a terminal view from the row.
        None => ProgressResponse {
            task_id,
            status: view.status,
            progress: if view.status == TaskStatus::Completed {
                100
            } else {
                0
            },
            current_step: None,
            steps: Vec::new(),
            errors: Vec::new(),
        },
    };
    Ok(Json(response))
}

/// `POST /api/tasks/{task_id}/retry` - reset from the resume step and
/// re-enqueue.
pub async fn retry(
    State(api): State<ApiState>,
    user: CurrentUser,
    Path(task_id): Path<Uuid>,
    Json(request): Json<RetryRequest>,
) -> ApiResult<Json<RetryResponse>> {
    let view = resolve_owned_task(&api, task_id, &user.user_id).await?;

    let mut state = match api.state.get_state_by_task(task_id).await? {
        Some(state) => state,
        None => {
            // Legacy fallback: adopt file-scoped state and bind it for
            // future lookups.
            let state = api
                .state
                .get_state(&view.upload_id)
                .await?
                .ok_or_else(|| {
                    ApiError::InvalidInput("task state unavailable for retry".to_string())
                })?;
            api.state.bind_task(&view.upload_id, task_id).await?;
            state
        }
    };
    if state.task_id.is_none() {
        state.task_id = Some(task_id);
        api.state.save_state(&state).await?;
    }

    if state.status != TaskStatus::Failed {
        return Err(ApiError::InvalidInput(
            "retry is only allowed for failed tasks".to_string(),
        ));
    }

    let requested = match request.step.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(raw.parse::<StepName>().map_err(|_| {
            ApiError::InvalidInput(format!("unknown step `{raw}`"))
        })?),
        _ => None,
    };
    let resume = state
        .resume_step(requested)
        .ok_or_else(|| ApiError::InvalidInput("task has no resumable steps".to_string()))?;

    let reset = api
        .state
        .reset_steps_from_task(task_id, resume)
        .await?
        .ok_or_else(|| ApiError::InvalidInput("failed to reset task steps".to_string()))?;

    // Move the record to processing so re-enqueue is accepted, then push.
    let _ = api
        .queue
        .update_status(task_id, TaskStatus::Processing, None)
        .await?;
    if !api.queue.enqueue_existing(task_id).await? {
        return Err(ApiError::InvalidInput(
            "task could not be enqueued for retry".to_string(),
        ));
    }
    if let Some(repo) = api.repo.as_ref() {
        if let Err(error) = repo.update_task(task_id, TaskStatus::Queued, None).await {
            warn!(task_id = %task_id, error = %error, "task row update failed on retry");
        }
    }

    info!(task_id = %task_id, step = %resume, "task retry queued");
    Ok(Json(RetryResponse {
        message: "Task retry queued".to_string(),
        step: resume.to_string(),
        status: reset.status,
    }))
}

/// `POST /api/tasks/{task_id}/cancel` - request cooperative cancellation.
pub async fn cancel(
    State(api): State<ApiState>,
    user: CurrentUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<CancelResponse>> {
    let _ = resolve_owned_task(&api, task_id, &user.user_id).await?;
    let cancelled = api.queue.cancel(task_id).await?;
    if cancelled {
        if let Some(repo) = api.repo.as_ref() {
            if let Err(error) = repo.update_task(task_id, TaskStatus::Cancelled, None).await {
                warn!(task_id = %task_id, error = %error, "task row update failed on cancel");
            }
        }
    }
    Ok(Json(CancelResponse { cancelled }))
}

/// `DELETE /api/tasks/{task_id}/delete` - cancel, remove all records, and
/// queue a purge when this was the upload's last task.
pub async fn delete(
    State(api): State<ApiState>,
    user: CurrentUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<DeleteResponse>> {
    let view = resolve_owned_task(&api, task_id, &user.user_id).await?;
    let file_id = view.upload_id.clone();

    // Stop any in-flight work first; a terminal task simply refuses.
    let _ = api.queue.cancel(task_id).await?;

    // Collect purge targets while state and rows still exist.
    let targets = collect_purge_targets(
        &api.state,
        api.repo.as_ref(),
        &api.output_dir,
        &file_id,
        Some(task_id),
        view.file_ext.as_deref(),
        &[],
        &[],
    )
    .await?;

    let _ = api.queue.delete_task(task_id).await?;
    let remaining = api.state.unbind_task(&file_id, task_id).await?;
    api.state.delete_task_state(task_id).await?;

    let mut sibling_rows = 0;
    if let Some(repo) = api.repo.as_ref() {
        let _ = repo.delete_task(task_id).await?;
        sibling_rows = repo.count_tasks_for_upload(&file_id).await?;
    }

    let mut purge_task_id = None;
    if remaining == 0 && sibling_rows == 0 {
        if let Some(repo) = api.repo.as_ref() {
            let _ = repo.delete_upload(&file_id).await?;
        }
        let storage_keys: Vec<String> = targets.storage_keys.iter().cloned().collect();
        let local_paths: Vec<String> = targets
            .local_paths
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        let purge_id = api
            .queue
            .submit(
                TaskType::FilePurge,
                TaskPayload {
                    file_id: file_id.clone(),
                    file_path: None,
                    file_ext: view.file_ext.clone(),
                    filename: None,
                    source_type: None,
                    knobs: slidecast_core::TaskKnobs::default(),
                    purge: Some(PurgeRequest {
                        target_task_id: Some(task_id),
                        storage_keys,
                        local_paths,
                    }),
                },
                Some(user.user_id.clone()),
            )
            .await?;
        purge_task_id = Some(purge_id);
        info!(task_id = %task_id, purge_task_id = %purge_id, "file purge queued for last task");
    }

    Ok(Json(DeleteResponse {
        deleted: true,
        purge_task_id,
    }))
}
