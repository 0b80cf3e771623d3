//! Steps specific to the slide-deck video pipeline.

use async_trait::async_trait;

use slidecast_core::{
    ArtifactCategory, ArtifactRef, ImageRef, StepData, StepName, StepStatus, TranscriptSegment,
    VisionNote,
};
use slidecast_storage::paths::OutputCategory;

use crate::context::StepContext;
use crate::error::{PipelineError, PipelineResult};
use crate::markdown;
use crate::retry::with_backoff;
use crate::runner::{PipelineStep, StepOutput};
use crate::steps::pdf::{render_subtitle_tracks, synthesize_narration};
use crate::steps::voice_transcripts;

fn missing(step: StepName, detail: &str) -> PipelineError {
    PipelineError::MissingPrerequisite {
        step,
        detail: detail.to_string(),
    }
}

fn slides_from(state: &slidecast_core::TaskState, step: StepName) -> PipelineResult<Vec<slidecast_core::SlideRef>> {
    match state
        .step(StepName::ExtractSlides)
        .and_then(|snapshot| snapshot.data.as_ref())
    {
        Some(StepData::Slides { slides }) if !slides.is_empty() => Ok(slides.clone()),
        _ => Err(missing(step, "extract_slides has no slide content")),
    }
}

/// Extract per-slide content from the uploaded deck.
pub struct ExtractSlidesStep;

#[async_trait]
impl PipelineStep for ExtractSlidesStep {
    fn name(&self) -> StepName {
        StepName::ExtractSlides
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let file_path = state
            .file_path
            .clone()
            .ok_or_else(|| missing(self.name(), "task state has no source file path"))?;
        let document = ctx.deps.engines.document.clone();
        let path = std::path::PathBuf::from(&file_path);
        let slides = with_backoff("extract_slides", || document.extract_slides(&path)).await?;
        if slides.is_empty() {
            return Err(missing(self.name(), "deck extraction produced no slides"));
        }
        Ok(StepOutput::data(StepData::Slides { slides }))
    }
}

/// Render each slide to a stored image.
pub struct ConvertSlidesToImagesStep;

#[async_trait]
impl PipelineStep for ConvertSlidesToImagesStep {
    fn name(&self) -> StepName {
        StepName::ConvertSlidesToImages
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let slides = slides_from(&state, self.name())?;
        let file_path = state
            .file_path
            .clone()
            .ok_or_else(|| missing(self.name(), "task state has no source file path"))?;
        let path = std::path::PathBuf::from(&file_path);

        let mut images = Vec::with_capacity(slides.len());
        for slide in &slides {
            ctx.check_cancelled().await?;
            let document = ctx.deps.engines.document.clone();
            let index = slide.index;
            let png =
                with_backoff("render_slide_image", || document.render_slide_image(&path, index))
                    .await?;
            let artifact = format!("slide_{}.png", slide.index + 1);
            let (storage_key, storage_uri) = ctx
                .store_output(OutputCategory::Images, &artifact, &png, "image/png")
                .await?;
            ctx.record_artifact(
                ArtifactCategory::Images,
                &format!("slide_{}", slide.index + 1),
                ArtifactRef {
                    storage_key: storage_key.clone(),
                    storage_uri: storage_uri.clone(),
                    local_path: None,
                    content_type: Some("image/png".to_string()),
                },
            )
            .await?;
            images.push(ImageRef {
                index: slide.index,
                storage_key,
                storage_uri,
                local_path: None,
            });
        }
        Ok(StepOutput::data(StepData::Images { images }))
    }
}

/// Describe slide images with the vision engine.
pub struct AnalyzeSlideImagesStep;

#[async_trait]
impl PipelineStep for AnalyzeSlideImagesStep {
    fn name(&self) -> StepName {
        StepName::AnalyzeSlideImages
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let images = match state
            .step(StepName::ConvertSlidesToImages)
            .and_then(|snapshot| snapshot.data.as_ref())
        {
            Some(StepData::Images { images }) if !images.is_empty() => images.clone(),
            _ => {
                return Err(missing(
                    self.name(),
                    "convert_slides_to_images has no image manifest",
                ))
            }
        };

        let mut notes = Vec::with_capacity(images.len());
        for image in &images {
            ctx.check_cancelled().await?;
            let png = ctx.deps.storage.get_bytes(&image.storage_key).await?;
            let language = ctx.deps.engines.language.clone();
            let description =
                with_backoff("describe_image", || language.describe_image(&png)).await?;
            notes.push(VisionNote {
                index: image.index,
                description,
            });
        }
        Ok(StepOutput::data(StepData::VisionNotes { notes }))
    }
}

/// Draft per-slide narration transcripts.
pub struct GenerateTranscriptsStep;

#[async_trait]
impl PipelineStep for GenerateTranscriptsStep {
    fn name(&self) -> StepName {
        StepName::GenerateTranscripts
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let slides = slides_from(&state, self.name())?;
        let notes = state
            .step(StepName::AnalyzeSlideImages)
            .filter(|snapshot| snapshot.status == StepStatus::Completed)
            .and_then(|snapshot| snapshot.data.as_ref())
            .and_then(|data| match data {
                StepData::VisionNotes { notes } => Some(notes.clone()),
                _ => None,
            });

        let language = ctx.deps.engines.language.clone();
        let segments = with_backoff("draft_transcripts", || {
            language.draft_transcripts(&slides, notes.as_deref())
        })
        .await?;
        Ok(StepOutput::data(StepData::Transcripts {
            language: "english".to_string(),
            segments,
        }))
    }
}

/// Revise slide transcripts for spoken delivery.
pub struct ReviseTranscriptsStep;

#[async_trait]
impl PipelineStep for ReviseTranscriptsStep {
    fn name(&self) -> StepName {
        StepName::ReviseTranscripts
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let drafts: Vec<TranscriptSegment> = match state
            .step(StepName::GenerateTranscripts)
            .and_then(|snapshot| snapshot.data.as_ref())
        {
            Some(StepData::Transcripts { segments, .. }) if !segments.is_empty() => {
                segments.clone()
            }
            _ => return Err(missing(self.name(), "generate_transcripts has no segments")),
        };

        let language = ctx.deps.engines.language.clone();
        let segments =
            with_backoff("revise_transcripts", || language.revise(&drafts, "english")).await?;

        let title = state.filename.clone().unwrap_or_else(|| state.file_id.clone());
        let rendered = markdown::render_transcript(&title, &segments);
        let (storage_key, storage_uri) = ctx
            .store_output(
                OutputCategory::Transcripts,
                "transcript.md",
                rendered.as_bytes(),
                "text/markdown",
            )
            .await?;
        ctx.record_artifact(
            ArtifactCategory::Transcripts,
            "markdown",
            ArtifactRef {
                storage_key,
                storage_uri,
                local_path: None,
                content_type: Some("text/markdown".to_string()),
            },
        )
        .await?;

        Ok(StepOutput::with_markdown(
            StepData::Transcripts {
                language: "english".to_string(),
                segments,
            },
            rendered,
        ))
    }
}

/// Synthesize narration audio per slide plus a combined track.
pub struct GenerateAudioStep;

#[async_trait]
impl PipelineStep for GenerateAudioStep {
    fn name(&self) -> StepName {
        StepName::GenerateAudio
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let (language, segments) = voice_transcripts(&state, self.name())?;
        synthesize_narration(ctx, self.name(), &language, &segments, state.knobs.voice_id.as_deref())
            .await
    }
}

/// Render presenter avatar clips, one per narration unit.
pub struct GenerateAvatarVideosStep;

#[async_trait]
impl PipelineStep for GenerateAvatarVideosStep {
    fn name(&self) -> StepName {
        StepName::GenerateAvatarVideos
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let audio = state
            .step(StepName::GenerateAudio)
            .and_then(|snapshot| snapshot.data.as_ref())
            .and_then(StepData::audio_segments)
            .ok_or_else(|| missing(self.name(), "generate_audio has no audio manifest"))?
            .to_vec();

        let workdir = ctx.workdir().await?;
        let mut clips = Vec::with_capacity(audio.len());
        for segment in &audio {
            ctx.check_cancelled().await?;
            let media = ctx.deps.engines.media.clone();
            let clip =
                with_backoff("render_avatar_clip", || media.render_avatar_clip(segment, &workdir))
                    .await?;
            let artifact = format!("avatar_{}.mp4", segment.index + 1);
            let (storage_key, storage_uri) = ctx
                .store_output_file(OutputCategory::Video, &artifact, &clip.local_path, "video/mp4")
                .await?;
            clips.push(ImageRef {
                index: segment.index,
                storage_key,
                storage_uri,
                local_path: Some(clip.local_path.display().to_string()),
            });
        }
        Ok(StepOutput::data(StepData::Clips { clips }))
    }
}

/// Render SRT and VTT subtitle tracks for the slide narration.
pub struct GenerateSubtitlesStep;

#[async_trait]
impl PipelineStep for GenerateSubtitlesStep {
    fn name(&self) -> StepName {
        StepName::GenerateSubtitles
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        render_subtitle_tracks(ctx, self.name(), &state, StepName::GenerateAudio).await
    }
}
