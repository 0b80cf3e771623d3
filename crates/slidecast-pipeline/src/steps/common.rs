//! Steps shared between the PDF and slide pipelines.

use async_trait::async_trait;

use slidecast_core::{
    ArtifactCategory, ArtifactRef, AudioSegment, ImageRef, StepData, StepName, StepStatus,
    SubtitleFormat, SubtitleTrack, TaskState,
};
use slidecast_storage::paths::OutputCategory;

use crate::context::StepContext;
use crate::error::{PipelineError, PipelineResult};
use crate::retry::with_backoff;
use crate::runner::{PipelineStep, StepOutput};
use crate::steps::completed_transcripts;

fn missing(step: StepName, detail: &str) -> PipelineError {
    PipelineError::MissingPrerequisite {
        step,
        detail: detail.to_string(),
    }
}

/// The revised English transcripts both translation steps start from.
fn revised_transcripts(
    state: &TaskState,
    step: StepName,
) -> PipelineResult<Vec<slidecast_core::TranscriptSegment>> {
    completed_transcripts(
        state,
        &[
            StepName::RevisePdfTranscripts,
            StepName::ReviseTranscripts,
            StepName::GenerateTranscripts,
        ],
    )
    .map(|(_, segments)| segments)
    .ok_or_else(|| missing(step, "no completed transcripts to translate"))
}

/// Translate the narration transcripts into the voice language.
pub struct TranslateVoiceTranscriptsStep;

#[async_trait]
impl PipelineStep for TranslateVoiceTranscriptsStep {
    fn name(&self) -> StepName {
        StepName::TranslateVoiceTranscripts
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let segments = revised_transcripts(&state, self.name())?;
        let target = state.knobs.voice_language.to_ascii_lowercase();
        let language = ctx.deps.engines.language.clone();
        let translated =
            with_backoff("translate_voice", || language.translate(&segments, &target)).await?;
        Ok(StepOutput::data(StepData::Transcripts {
            language: target,
            segments: translated,
        }))
    }
}

/// Translate the subtitle transcripts into the subtitle language.
pub struct TranslateSubtitleTranscriptsStep;

#[async_trait]
impl PipelineStep for TranslateSubtitleTranscriptsStep {
    fn name(&self) -> StepName {
        StepName::TranslateSubtitleTranscripts
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let segments = revised_transcripts(&state, self.name())?;
        let target = state
            .knobs
            .subtitle_language
            .clone()
            .ok_or_else(|| missing(self.name(), "no subtitle language configured"))?
            .to_ascii_lowercase();
        let language = ctx.deps.engines.language.clone();
        let translated =
            with_backoff("translate_subtitles", || language.translate(&segments, &target))
                .await?;
        Ok(StepOutput::data(StepData::Transcripts {
            language: target,
            segments: translated,
        }))
    }
}

/// Assemble the final video from per-unit images and audio.
pub struct ComposeVideoStep;

#[async_trait]
impl PipelineStep for ComposeVideoStep {
    fn name(&self) -> StepName {
        StepName::ComposeVideo
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let images = image_manifest(&state)
            .ok_or_else(|| missing(self.name(), "no completed image manifest"))?;
        let audio = audio_manifest(&state)
            .ok_or_else(|| missing(self.name(), "no completed audio manifest"))?;
        let subtitle = subtitle_track(&state);

        ctx.check_cancelled().await?;
        let workdir = ctx.workdir().await?;
        let media = ctx.deps.engines.media.clone();
        let composed = with_backoff("compose_video", || {
            media.compose_video(&images, &audio, subtitle.as_ref(), &workdir)
        })
        .await?;

        let (storage_key, storage_uri) = ctx
            .store_output_file(
                OutputCategory::Video,
                "final.mp4",
                &composed.local_path,
                "video/mp4",
            )
            .await?;
        ctx.record_artifact(
            ArtifactCategory::Video,
            "final",
            ArtifactRef {
                storage_key: storage_key.clone(),
                storage_uri: storage_uri.clone(),
                local_path: Some(composed.local_path.display().to_string()),
                content_type: Some("video/mp4".to_string()),
            },
        )
        .await?;

        Ok(StepOutput::data(StepData::Compose {
            storage_key,
            storage_uri,
            local_path: Some(composed.local_path.display().to_string()),
            duration_secs: composed.duration_secs,
        }))
    }
}

fn image_manifest(state: &TaskState) -> Option<Vec<ImageRef>> {
    for step in [
        StepName::GeneratePdfChapterImages,
        StepName::ConvertSlidesToImages,
    ] {
        if let Some(snapshot) = state.step(step) {
            if snapshot.status == StepStatus::Completed {
                if let Some(StepData::Images { images }) = &snapshot.data {
                    return Some(images.clone());
                }
            }
        }
    }
    None
}

fn audio_manifest(state: &TaskState) -> Option<Vec<AudioSegment>> {
    for step in [StepName::GeneratePdfAudio, StepName::GenerateAudio] {
        if let Some(snapshot) = state.step(step) {
            if snapshot.status == StepStatus::Completed {
                if let Some(data) = &snapshot.data {
                    if let Some(segments) = data.audio_segments() {
                        return Some(segments.to_vec());
                    }
                }
            }
        }
    }
    None
}

fn subtitle_track(state: &TaskState) -> Option<SubtitleTrack> {
    for step in [StepName::GeneratePdfSubtitles, StepName::GenerateSubtitles] {
        if let Some(snapshot) = state.step(step) {
            if snapshot.status == StepStatus::Completed {
                if let Some(StepData::Subtitles { tracks }) = &snapshot.data {
                    if let Some(track) =
                        tracks.iter().find(|track| track.format == SubtitleFormat::Vtt)
                    {
                        return Some(track.clone());
                    }
                }
            }
        }
    }
    None
}
