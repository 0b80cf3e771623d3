//! Artifact download endpoints.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use slidecast_core::TaskState;
use slidecast_pipeline::artifacts::downloads_for_state;
use slidecast_pipeline::locale_code;
use slidecast_storage::paths::{
    audio_key_candidates, podcast_key_candidates, subtitle_key_candidates, video_key_candidates,
};

use crate::auth::CurrentUser;
use crate::dto::{DownloadsResponse, SubtitleQuery, TaskView};
use crate::error::{ApiError, ApiResult};
use crate::media::{resolve_existing_key, serve_object};
use crate::service::resolve_owned_task;
use crate::state::ApiState;

/// Which composed artifact a media endpoint serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Video,
    Audio,
    Podcast,
}

impl MediaKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "podcast" => Some(Self::Podcast),
            _ => None,
        }
    }

    const fn content_type(self) -> &'static str {
        match self {
            Self::Video => "video/mp4",
            Self::Audio | Self::Podcast => "audio/mpeg",
        }
    }

    const fn filename(self) -> &'static str {
        match self {
            Self::Video => "video.mp4",
            Self::Audio => "audio.mp3",
            Self::Podcast => "podcast.mp3",
        }
    }

    fn artifact_key(self, state: &TaskState) -> Option<String> {
        let bucket = match self {
            Self::Video => &state.artifacts.video,
            Self::Audio => &state.artifacts.audio,
            Self::Podcast => &state.artifacts.podcast,
        };
        bucket
            .get("final")
            .map(|artifact| artifact.storage_key.clone())
    }

    fn candidates(self, base_id: &str) -> Vec<String> {
        match self {
            Self::Video => video_key_candidates(base_id),
            Self::Audio => audio_key_candidates(base_id),
            Self::Podcast => podcast_key_candidates(base_id),
        }
    }
}

/// `GET /api/tasks/{task_id}/downloads` - enumerate available artifacts.
pub async fn list_downloads(
    State(api): State<ApiState>,
    user: CurrentUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<DownloadsResponse>> {
    let _ = resolve_owned_task(&api, task_id, &user.user_id).await?;
    let downloads = api
        .state
        .get_state_by_task(task_id)
        .await?
        .map(|state| downloads_for_state(&state))
        .unwrap_or_default();
    Ok(Json(DownloadsResponse { task_id, downloads }))
}

/// `GET /api/tasks/{task_id}/{video|audio|podcast}` - inline media.
pub async fn media(
    State(api): State<ApiState>,
    user: CurrentUser,
    Path((task_id, kind)): Path<(Uuid, String)>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    serve_media(&api, &user, task_id, &kind, false, &headers).await
}

/// `GET /api/tasks/{task_id}/{video|audio|podcast}/download` - attachment.
pub async fn media_download(
    State(api): State<ApiState>,
    user: CurrentUser,
    Path((task_id, kind)): Path<(Uuid, String)>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    serve_media(&api, &user, task_id, &kind, true, &headers).await
}

async fn serve_media(
    api: &ApiState,
    user: &CurrentUser,
    task_id: Uuid,
    kind_raw: &str,
    attachment: bool,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let kind = MediaKind::parse(kind_raw)
        .ok_or_else(|| ApiError::InvalidInput(format!("unknown media kind `{kind_raw}`")))?;
    let view = resolve_owned_task(api, task_id, &user.user_id).await?;
    let state = api.state.get_state_by_task(task_id).await?;

    // Resolution order: recorded artifact, canonical/legacy keys under the
    // task id, then under the upload id.
    let mut candidates = Vec::new();
    if let Some(state) = &state {
        if let Some(key) = kind.artifact_key(state) {
            candidates.push(key);
        }
    }
    candidates.extend(kind.candidates(&task_id.to_string()));
    candidates.extend(kind.candidates(&view.upload_id));
    let key = resolve_existing_key(api.storage.as_ref(), &candidates).await?;

    serve_object(
        api.storage.as_ref(),
        &key,
        kind.content_type(),
        attachment.then(|| kind.filename()),
        api.proxy_cloud_media,
        headers,
    )
    .await
}

/// `GET /api/tasks/{task_id}/subtitles/{format}` - subtitle download with
/// locale fallback: request param → task row → state → English.
pub async fn subtitles(
    State(api): State<ApiState>,
    user: CurrentUser,
    Path((task_id, format)): Path<(Uuid, String)>,
    Query(query): Query<SubtitleQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    if format != "srt" && format != "vtt" {
        return Err(ApiError::InvalidInput(format!(
            "unknown subtitle format `{format}`"
        )));
    }
    let view = resolve_owned_task(&api, task_id, &user.user_id).await?;
    let state = api.state.get_state_by_task(task_id).await?;

    let locale = resolve_subtitle_locale(query.language.as_deref(), &view, state.as_ref());

    let mut candidates = Vec::new();
    if let Some(state) = &state {
        if let Some(artifact) = state.artifacts.subtitles.get(&locale) {
            // Recorded artifact points at the VTT; derive the sibling SRT by
            // extension swap within the same layout.
            let key = artifact.storage_key.clone();
            if format == "vtt" {
                candidates.push(key);
            } else if let Some(stem) = key.strip_suffix(".vtt") {
                candidates.push(format!("{stem}.srt"));
            }
        }
    }
    candidates.extend(subtitle_key_candidates(&task_id.to_string(), &locale, &format));
    candidates.extend(subtitle_key_candidates(&view.upload_id, &locale, &format));
    let key = resolve_existing_key(api.storage.as_ref(), &candidates).await?;

    let content_type = if format == "vtt" { "text/vtt" } else { "text/plain" };
    serve_object(
        api.storage.as_ref(),
        &key,
        content_type,
        Some(&format!("subtitles_{locale}.{format}")),
        api.proxy_cloud_media,
        &headers,
    )
    .await
}

fn resolve_subtitle_locale(
    requested: Option<&str>,
    view: &TaskView,
    state: Option<&TaskState>,
) -> String {
    if let Some(language) = requested {
        let trimmed = language.trim();
        if !trimmed.is_empty() {
            return locale_code(trimmed);
        }
    }
    if let Some(language) = &view.subtitle_language {
        if !language.trim().is_empty() {
            return locale_code(language);
        }
    }
    if let Some(state) = state {
        return locale_code(&state.knobs.effective_subtitle_language());
    }
    "en".to_string()
}
