//! Router assembly.

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::routes;
use crate::state::ApiState;

/// Request body cap; sized to the upload limit plus multipart overhead.
const MAX_BODY_BYTES: usize = 210 * 1024 * 1024;

/// Build the full API router over the shared handler state.
#[must_use]
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/upload", post(routes::upload::upload))
        .route("/api/files/{file_id}/run", post(routes::upload::run_again))
        .route("/api/tasks", get(routes::tasks::list_tasks))
        .route("/api/tasks/statistics", get(routes::tasks::statistics))
        .route("/api/tasks/{task_id}", get(routes::tasks::get_task))
        .route("/api/tasks/{task_id}/status", get(routes::tasks::get_task))
        .route("/api/tasks/{task_id}/progress", get(routes::tasks::progress))
        .route("/api/tasks/{task_id}/retry", post(routes::tasks::retry))
        .route("/api/tasks/{task_id}/cancel", post(routes::tasks::cancel))
        .route("/api/tasks/{task_id}/delete", delete(routes::tasks::delete))
        .route(
            "/api/tasks/{task_id}/downloads",
            get(routes::downloads::list_downloads),
        )
        .route(
            "/api/tasks/{task_id}/subtitles/{format}",
            get(routes::downloads::subtitles),
        )
        .route("/api/tasks/{task_id}/{kind}", get(routes::downloads::media))
        .route(
            "/api/tasks/{task_id}/{kind}/download",
            get(routes::downloads::media_download),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use tower::ServiceExt;

    use slidecast_core::PlanOptions;
    use slidecast_queue::TaskQueue;
    use slidecast_state::{MemoryKv, SessionRecord, SessionStore, StateStore};
    use slidecast_storage::LocalStorage;

    async fn test_state() -> (ApiState, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = Arc::new(MemoryKv::new());
        let state = ApiState {
            repo: None,
            state: StateStore::new(kv.clone()),
            sessions: SessionStore::new(kv.clone()),
            queue: TaskQueue::new(kv),
            storage: Arc::new(LocalStorage::new(dir.path().join("storage"))),
            uploads_dir: dir.path().join("uploads"),
            output_dir: dir.path().join("storage"),
            proxy_cloud_media: false,
            plan_options: PlanOptions::default(),
        };
        (state, dir)
    }

    #[tokio::test]
    async fn health_is_open() {
        let (state, _dir) = test_state().await;
        let app = build_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_routes_require_a_session() {
        let (state, _dir) = test_state().await;
        let app = build_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/tasks")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_tasks_return_not_found_for_valid_sessions() {
        let (state, _dir) = test_state().await;
        state
            .sessions
            .put(&SessionRecord {
                session_id: "sid-1".to_string(),
                user_id: "user-1".to_string(),
                created_at: Utc::now(),
            })
            .await
            .expect("session");
        let app = build_router(state);

        let task_id = uuid::Uuid::new_v4();
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/tasks/{task_id}/progress"))
                    .header("authorization", "Bearer sid-1")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn foreign_tasks_are_indistinguishable_from_missing() {
        let (state, _dir) = test_state().await;
        for (sid, user) in [("sid-owner", "owner"), ("sid-other", "other")] {
            state
                .sessions
                .put(&SessionRecord {
                    session_id: sid.to_string(),
                    user_id: user.to_string(),
                    created_at: Utc::now(),
                })
                .await
                .expect("session");
        }

        // Submit a task owned by `owner` through the queue directly.
        let task_id = state
            .queue
            .submit(
                slidecast_core::TaskType::Video,
                slidecast_queue::TaskPayload {
                    file_id: "abcd1234abcd1234".to_string(),
                    file_path: None,
                    file_ext: Some(".pdf".to_string()),
                    filename: None,
                    source_type: None,
                    knobs: slidecast_core::TaskKnobs::default(),
                    purge: None,
                },
                Some("owner".to_string()),
            )
            .await
            .expect("submit");

        let app = build_router(state);
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/tasks/{task_id}"))
                    .header("authorization", "Bearer sid-other")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/tasks/{task_id}"))
                    .header("authorization", "Bearer sid-owner")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
