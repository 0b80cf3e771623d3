//! Steps for the two-speaker podcast pipeline (PDF sources).

use async_trait::async_trait;
use serde::Serialize;

use slidecast_core::{
    ArtifactCategory, ArtifactRef, AudioSegment, DialogueLine, Speaker, StepData, StepName,
    StepStatus, SubtitleFormat, SubtitleTrack, TaskState,
};
use slidecast_storage::paths::OutputCategory;

use crate::context::StepContext;
use crate::error::{PipelineError, PipelineResult};
use crate::markdown;
use crate::retry::with_backoff;
use crate::runner::{PipelineStep, StepOutput};
use crate::steps::locale_code;
use crate::subtitles::{self, TimedUnit};

fn missing(step: StepName, detail: &str) -> PipelineError {
    PipelineError::MissingPrerequisite {
        step,
        detail: detail.to_string(),
    }
}

/// The dialogue the audio and subtitle steps should speak: the translated
/// script when present, the original otherwise.
fn effective_dialogue(
    state: &TaskState,
    step: StepName,
) -> PipelineResult<(String, Vec<DialogueLine>)> {
    for candidate in [
        StepName::TranslatePodcastScript,
        StepName::GeneratePodcastScript,
    ] {
        let Some(snapshot) = state.step(candidate) else {
            continue;
        };
        if snapshot.status != StepStatus::Completed {
            continue;
        }
        if let Some(StepData::PodcastScript {
            language, dialogue, ..
        }) = &snapshot.data
        {
            return Ok((language.clone(), dialogue.clone()));
        }
    }
    Err(missing(step, "no completed podcast script"))
}

/// Serialized transcript document exposed on the download surface.
#[derive(Serialize)]
struct PodcastTranscriptDoc<'a> {
    language: &'a str,
    dialogue: &'a [DialogueLine],
}

async fn publish_transcript_json(
    ctx: &StepContext,
    language: &str,
    dialogue: &[DialogueLine],
) -> PipelineResult<()> {
    let doc = PodcastTranscriptDoc { language, dialogue };
    let payload = serde_json::to_vec(&doc).unwrap_or_default();
    let (storage_key, storage_uri) = ctx
        .store_output(
            OutputCategory::Transcripts,
            "podcast.json",
            &payload,
            "application/json",
        )
        .await?;
    ctx.record_artifact(
        ArtifactCategory::Transcripts,
        "podcast",
        ArtifactRef {
            storage_key,
            storage_uri,
            local_path: None,
            content_type: Some("application/json".to_string()),
        },
    )
    .await
}

/// Draft the two-speaker dialogue from the chapter segmentation, always in
/// English.
pub struct GeneratePodcastScriptStep;

#[async_trait]
impl PipelineStep for GeneratePodcastScriptStep {
    fn name(&self) -> StepName {
        StepName::GeneratePodcastScript
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let chapters = state
            .step(StepName::SegmentPdfContent)
            .and_then(|snapshot| snapshot.data.as_ref())
            .and_then(StepData::chapters)
            .ok_or_else(|| missing(self.name(), "segment_pdf_content has no chapters"))?
            .to_vec();

        let language = ctx.deps.engines.language.clone();
        let dialogue =
            with_backoff("podcast_dialogue", || language.podcast_dialogue(&chapters)).await?;
        if dialogue.is_empty() {
            return Err(missing(self.name(), "script generation produced no dialogue"));
        }

        publish_transcript_json(ctx, "english", &dialogue).await?;
        let rendered = markdown::render_dialogue(
            state.filename.as_deref().unwrap_or("Podcast"),
            &dialogue,
        );
        Ok(StepOutput::with_markdown(
            StepData::PodcastScript {
                language: "english".to_string(),
                dialogue,
                host_voice: state.knobs.podcast_host_voice.clone(),
                guest_voice: state.knobs.podcast_guest_voice.clone(),
            },
            rendered,
        ))
    }
}

/// Translate the dialogue into the transcript language.
pub struct TranslatePodcastScriptStep;

#[async_trait]
impl PipelineStep for TranslatePodcastScriptStep {
    fn name(&self) -> StepName {
        StepName::TranslatePodcastScript
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let dialogue = match state
            .step(StepName::GeneratePodcastScript)
            .and_then(|snapshot| snapshot.data.as_ref())
        {
            Some(StepData::PodcastScript { dialogue, .. }) if !dialogue.is_empty() => {
                dialogue.clone()
            }
            _ => return Err(missing(self.name(), "generate_podcast_script has no dialogue")),
        };

        // Always derived from the explicit transcript-language knob; never
        // re-inferred from intermediate state.
        let target = state.knobs.podcast_transcript_language();
        let language = ctx.deps.engines.language.clone();
        let translated = with_backoff("translate_dialogue", || {
            language.translate_dialogue(&dialogue, &target)
        })
        .await?;

        publish_transcript_json(ctx, &target, &translated).await?;
        let rendered = markdown::render_dialogue(
            state.filename.as_deref().unwrap_or("Podcast"),
            &translated,
        );
        Ok(StepOutput::with_markdown(
            StepData::PodcastScript {
                language: target,
                dialogue: translated,
                host_voice: state.knobs.podcast_host_voice.clone(),
                guest_voice: state.knobs.podcast_guest_voice.clone(),
            },
            rendered,
        ))
    }
}

/// Synthesize the dialogue with alternating host and guest voices.
pub struct GeneratePodcastAudioStep;

#[async_trait]
impl PipelineStep for GeneratePodcastAudioStep {
    fn name(&self) -> StepName {
        StepName::GeneratePodcastAudio
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let (_, dialogue) = effective_dialogue(&state, self.name())?;
        let voice_language = state.knobs.voice_language.to_ascii_lowercase();

        let mut manifest = Vec::with_capacity(dialogue.len());
        for (position, line) in dialogue.iter().enumerate() {
            ctx.check_cancelled().await?;
            let voice = match line.speaker {
                Speaker::Host => state.knobs.podcast_host_voice.clone(),
                Speaker::Guest => state.knobs.podcast_guest_voice.clone(),
            };
            let speech = ctx.deps.engines.speech.clone();
            let text = line.text.clone();
            let voice_language_ref = voice_language.clone();
            let synthesized = with_backoff("synthesize_podcast", || {
                speech.synthesize(&text, &voice_language_ref, voice.as_deref())
            })
            .await?;
            let artifact = format!("line_{}.mp3", position + 1);
            let (storage_key, storage_uri) = ctx
                .store_output(
                    OutputCategory::Podcast,
                    &artifact,
                    &synthesized.bytes,
                    "audio/mpeg",
                )
                .await?;
            manifest.push(AudioSegment {
                index: position as u32,
                storage_key,
                storage_uri,
                local_path: None,
                duration_secs: synthesized.duration_secs,
            });
        }
        Ok(StepOutput::data(StepData::Audio { segments: manifest }))
    }
}

/// Render SRT and VTT subtitle tracks for the podcast dialogue.
pub struct GeneratePodcastSubtitlesStep;

#[async_trait]
impl PipelineStep for GeneratePodcastSubtitlesStep {
    fn name(&self) -> StepName {
        StepName::GeneratePodcastSubtitles
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let (language, dialogue) = effective_dialogue(&state, self.name())?;
        let audio = state
            .step(StepName::GeneratePodcastAudio)
            .and_then(|snapshot| snapshot.data.as_ref())
            .and_then(StepData::audio_segments)
            .ok_or_else(|| missing(self.name(), "generate_podcast_audio has no audio manifest"))?
            .to_vec();

        let locale = locale_code(&language);
        let units: Vec<TimedUnit> = dialogue
            .iter()
            .enumerate()
            .map(|(position, line)| TimedUnit {
                text: line.text.clone(),
                duration_secs: audio
                    .iter()
                    .find(|segment| segment.index == position as u32)
                    .map_or(0.0, |segment| segment.duration_secs),
            })
            .collect();

        let mut tracks = Vec::with_capacity(2);
        for format in [SubtitleFormat::Srt, SubtitleFormat::Vtt] {
            ctx.check_cancelled().await?;
            let rendered = subtitles::render(&units, format);
            let artifact = format!("podcast_{locale}.{}", format.extension());
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
                    &format!("podcast_{locale}"),
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
}

/// Concatenate the dialogue audio into the final podcast MP3.
pub struct ComposePodcastStep;

#[async_trait]
impl PipelineStep for ComposePodcastStep {
    fn name(&self) -> StepName {
        StepName::ComposePodcast
    }

    async fn run(&self, ctx: &StepContext) -> PipelineResult<StepOutput> {
        let state = ctx.state().await?;
        let audio = state
            .step(StepName::GeneratePodcastAudio)
            .and_then(|snapshot| snapshot.data.as_ref())
            .and_then(StepData::audio_segments)
            .ok_or_else(|| missing(self.name(), "generate_podcast_audio has no audio manifest"))?
            .to_vec();

        ctx.check_cancelled().await?;
        let workdir = ctx.workdir().await?;
        let media = ctx.deps.engines.media.clone();
        let composed = with_backoff("compose_podcast", || media.concat_audio(&audio, &workdir)).await?;

        let (storage_key, storage_uri) = ctx
            .store_output_file(
                OutputCategory::Podcast,
                "final.mp3",
                &composed.local_path,
                "audio/mpeg",
            )
            .await?;
        ctx.record_artifact(
            ArtifactCategory::Podcast,
            "final",
            ArtifactRef {
                storage_key: storage_key.clone(),
                storage_uri: storage_uri.clone(),
                local_path: Some(composed.local_path.display().to_string()),
                content_type: Some("audio/mpeg".to_string()),
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
