//! Steps specific to the PDF video pipeline.

use async_trait::async_trait;

use slidecast_core::{
    ArtifactCategory, ArtifactRef, AudioSegment, ImageRef, StepData, StepName, SubtitleFormat,
    SubtitleTrack, TranscriptSegment,
};
use slidecast_storage::paths::OutputCategory;

use crate::context::StepContext;
use crate::error::{PipelineError, PipelineResult};
use crate::markdown;
use crate::retry::with_backoff;
use crate::runner::{PipelineStep, StepOutput};
use crate::steps::{locale_code, subtitle_transcripts, voice_transcripts};
use crate::subtitles::{self, TimedUnit};

/// Split the uploaded PDF into narrated chapters.
pub struct SegmentPdfContentStep;

#[async_trait]
impl PipelineStep for SegmentPdfContentStep {
    fn name(&self) -> StepName {
        StepName::SegmentPdfContent
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let file_path = state.file_path.clone().ok_or_else(|| {
            PipelineError::MissingPrerequisite {
                step: self.name(),
                detail: "task state has no source file path".to_string(),
            }
        })?;

        let document = ctx.deps.engines.document.clone();
        let path = std::path::PathBuf::from(&file_path);
        let chapters =
            with_backoff("segment_pdf", || document.segment_pdf(&path)).await?;
        if chapters.is_empty() {
            return Err(PipelineError::MissingPrerequisite {
                step: self.name(),
                detail: "document segmentation produced no chapters".to_string(),
            });
        }
        Ok(StepOutput::data(StepData::Chapters { chapters }))
    }
}

/// Revise chapter content into spoken English narration.
pub struct RevisePdfTranscriptsStep;

#[async_trait]
impl PipelineStep for RevisePdfTranscriptsStep {
    fn name(&self) -> StepName {
        StepName::RevisePdfTranscripts
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let chapters = state
            .step(StepName::SegmentPdfContent)
            .and_then(|snapshot| snapshot.data.as_ref())
            .and_then(StepData::chapters)
            .ok_or_else(|| PipelineError::MissingPrerequisite {
                step: self.name(),
                detail: "segment_pdf_content has no chapters".to_string(),
            })?;

        let drafts: Vec<TranscriptSegment> = chapters
            .iter()
            .map(|chapter| TranscriptSegment {
                index: chapter.index,
                title: Some(chapter.title.clone()),
                text: chapter.content.clone(),
            })
            .collect();

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

/// Generate one illustration image per chapter.
pub struct GeneratePdfChapterImagesStep;

#[async_trait]
impl PipelineStep for GeneratePdfChapterImagesStep {
    fn name(&self) -> StepName {
        StepName::GeneratePdfChapterImages
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let chapters = state
            .step(StepName::SegmentPdfContent)
            .and_then(|snapshot| snapshot.data.as_ref())
            .and_then(StepData::chapters)
            .ok_or_else(|| PipelineError::MissingPrerequisite {
                step: self.name(),
                detail: "segment_pdf_content has no chapters".to_string(),
            })?
            .to_vec();

        let mut images = Vec::with_capacity(chapters.len());
        for chapter in &chapters {
            ctx.check_cancelled().await?;
            let document = ctx.deps.engines.document.clone();
            let png = with_backoff("render_chapter_image", || {
                document.render_chapter_image(chapter)
            })
            .await?;
            let artifact = format!("chapter_{}.png", chapter.index + 1);
            let (storage_key, storage_uri) = ctx
                .store_output(OutputCategory::Images, &artifact, &png, "image/png")
                .await?;
            ctx.record_artifact(
                ArtifactCategory::Images,
                &format!("chapter_{}", chapter.index + 1),
                ArtifactRef {
                    storage_key: storage_key.clone(),
                    storage_uri: storage_uri.clone(),
                    local_path: None,
                    content_type: Some("image/png".to_string()),
                },
            )
            .await?;
            images.push(ImageRef {
                index: chapter.index,
                storage_key,
                storage_uri,
                local_path: None,
            });
        }
        Ok(StepOutput::data(StepData::Images { images }))
    }
}

/// Synthesize narration audio per chapter and a combined track.
pub struct GeneratePdfAudioStep;

#[async_trait]
impl PipelineStep for GeneratePdfAudioStep {
    fn name(&self) -> StepName {
        StepName::GeneratePdfAudio
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let (language, segments) = voice_transcripts(&state, self.name())?;
        synthesize_narration(ctx, self.name(), &language, &segments, state.knobs.voice_id.as_deref())
            .await
    }
}

/// Render SRT and VTT subtitle tracks for the chapter narration.
pub struct GeneratePdfSubtitlesStep;

#[async_trait]
impl PipelineStep for GeneratePdfSubtitlesStep {
    fn name(&self) -> StepName {
        StepName::GeneratePdfSubtitles
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let audio_step = StepName::GeneratePdfAudio;
        render_subtitle_tracks(ctx, self.name(), &state, audio_step).await
    }
}

/// Shared narration synthesis: one MP3 per unit plus a combined track.
pub(crate) async fn synthesize_narration(
    ctx: &StepContext,
    step: StepName,
    language: &str,
    segments: &[TranscriptSegment],
    voice: Option<&str>,
) -> PipelineResult<StepOutput> {
    if segments.is_empty() {
        return Err(PipelineError::MissingPrerequisite {
            step,
            detail: "transcript set is empty".to_string(),
        });
    }

    let mut manifest = Vec::with_capacity(segments.len());
    for segment in segments {
        ctx.check_cancelled().await?;
        let speech = ctx.deps.engines.speech.clone();
        let text = segment.text.clone();
        let language_owned = language.to_string();
        let voice_owned = voice.map(str::to_string);
        let synthesized = with_backoff("synthesize", || {
            speech.synthesize(&text, &language_owned, voice_owned.as_deref())
        })
        .await?;
        let artifact = format!("part_{}.mp3", segment.index + 1);
        let (storage_key, storage_uri) = ctx
            .store_output(
                OutputCategory::Audio,
                &artifact,
                &synthesized.bytes,
                "audio/mpeg",
            )
            .await?;
        manifest.push(AudioSegment {
            index: segment.index,
            storage_key,
            storage_uri,
            local_path: None,
            duration_secs: synthesized.duration_secs,
        });
    }

    // Combined narration track for the download surface.
    let workdir = ctx.workdir().await?;
    let media = ctx.deps.engines.media.clone();
    let combined = with_backoff("concat_audio", || media.concat_audio(&manifest, &workdir)).await?;
    let (storage_key, storage_uri) = ctx
        .store_output_file(
            OutputCategory::Audio,
            "final.mp3",
            &combined.local_path,
            "audio/mpeg",
        )
        .await?;
    ctx.record_artifact(
        ArtifactCategory::Audio,
        "final",
        ArtifactRef {
            storage_key,
            storage_uri,
            local_path: Some(combined.local_path.display().to_string()),
            content_type: Some("audio/mpeg".to_string()),
        },
    )
    .await?;

    Ok(StepOutput::data(StepData::Audio { segments: manifest }))
}

/// Shared subtitle rendering: one SRT and one VTT track in the effective
/// subtitle locale, timed by the audio step's durations.
pub(crate) async fn render_subtitle_tracks(
    ctx: &StepContext,
    step: StepName,
    state: &slidecast_core::TaskState,
    audio_step: StepName,
) -> PipelineResult<StepOutput> {
    let (_language, segments) = subtitle_transcripts(state, step)?;
    let audio = state
        .step(audio_step)
        .and_then(|snapshot| snapshot.data.as_ref())
        .and_then(StepData::audio_segments)
        .ok_or_else(|| PipelineError::MissingPrerequisite {
            step,
            detail: format!("{audio_step} has no audio manifest"),
        })?;

    let locale = locale_code(&state.knobs.effective_subtitle_language());
    let units: Vec<TimedUnit> = segments
        .iter()
        .map(|segment| TimedUnit {
            text: segment.text.clone(),
            duration_secs: audio
                .iter()
                .find(|unit| unit.index == segment.index)
                .map_or(0.0, |unit| unit.duration_secs),
        })
        .collect();

    let mut tracks = Vec::with_capacity(2);
    for format in [SubtitleFormat::Srt, SubtitleFormat::Vtt] {
        ctx.check_cancelled().await?;
        let rendered = subtitles::render(&units, format);
        let artifact = format!("final_{locale}.{}", format.extension());
        let (storage_key, storage_uri) = ctx
            .store_output(
                OutputCategory::Subtitles,
                &artifact,
                rendered.as_bytes(),
                format.content_type(),
            )
            .await?;
        if format == SubtitleFormat::Vtt {
            ctx.record_artifact(
                ArtifactCategory::Subtitles,
                &locale,
                ArtifactRef {
                    storage_key: storage_key.clone(),
                    storage_uri: storage_uri.clone(),
                    local_path: None,
                    content_type: Some(format.content_type().to_string()),
                },
            )
            .await?;
        }
        tracks.push(SubtitleTrack {
            locale: locale.clone(),
            format,
            storage_key,
            storage_uri,
            local_path: None,
        });
    }
    Ok(StepOutput::data(StepData::Subtitles { tracks }))
}
