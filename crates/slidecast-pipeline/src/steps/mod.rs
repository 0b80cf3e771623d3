//! Built-in step implementations, grouped by variant.

pub mod common;
pub mod pdf;
pub mod podcast;
pub mod purge;
pub mod slides;

use std::sync::Arc;

use slidecast_core::{StepData, StepName, StepStatus, TaskState, TranscriptSegment};

use crate::error::{PipelineError, PipelineResult};
use crate::runner::PipelineStep;

/// Every built-in step implementation.
#[must_use]
pub fn all_steps() -> Vec<Arc<dyn PipelineStep>> {
    vec![
        Arc::new(pdf::SegmentPdfContentStep),
        Arc::new(pdf::RevisePdfTranscriptsStep),
        Arc::new(pdf::GeneratePdfChapterImagesStep),
        Arc::new(pdf::GeneratePdfAudioStep),
        Arc::new(pdf::GeneratePdfSubtitlesStep),
        Arc::new(slides::ExtractSlidesStep),
        Arc::new(slides::ConvertSlidesToImagesStep),
        Arc::new(slides::AnalyzeSlideImagesStep),
        Arc::new(slides::GenerateTranscriptsStep),
        Arc::new(slides::ReviseTranscriptsStep),
        Arc::new(slides::GenerateAudioStep),
        Arc::new(slides::GenerateAvatarVideosStep),
        Arc::new(slides::GenerateSubtitlesStep),
        Arc::new(common::TranslateVoiceTranscriptsStep),
        Arc::new(common::TranslateSubtitleTranscriptsStep),
        Arc::new(common::ComposeVideoStep),
        Arc::new(podcast::GeneratePodcastScriptStep),
        Arc::new(podcast::TranslatePodcastScriptStep),
        Arc::new(podcast::GeneratePodcastAudioStep),
        Arc::new(podcast::GeneratePodcastSubtitlesStep),
        Arc::new(podcast::ComposePodcastStep),
        Arc::new(purge::PurgeTaskFilesStep),
    ]
}

/// Read the first completed transcript payload among `candidates`, in order.
pub(crate) fn completed_transcripts(
    state: &TaskState,
    candidates: &[StepName],
) -> Option<(String, Vec<TranscriptSegment>)> {
    for candidate in candidates {
        let Some(snapshot) = state.step(*candidate) else {
            continue;
        };
        if snapshot.status != StepStatus::Completed {
            continue;
        }
        if let Some(StepData::Transcripts { language, segments }) = &snapshot.data {
            return Some((language.clone(), segments.clone()));
        }
    }
    None
}

/// Transcripts that narration audio should be synthesized from: the
/// voice-translated set when present, the revised English set otherwise.
pub(crate) fn voice_transcripts(
    state: &TaskState,
    step: StepName,
) -> PipelineResult<(String, Vec<TranscriptSegment>)> {
    completed_transcripts(
        state,
        &[
            StepName::TranslateVoiceTranscripts,
            StepName::RevisePdfTranscripts,
            StepName::ReviseTranscripts,
            StepName::GenerateTranscripts,
        ],
    )
    .ok_or_else(|| PipelineError::MissingPrerequisite {
        step,
        detail: "no completed transcripts to narrate".to_string(),
    })
}

/// Transcripts that subtitles should be rendered from: the
/// subtitle-translated set when present, otherwise the narration set.
pub(crate) fn subtitle_transcripts(
    state: &TaskState,
    step: StepName,
) -> PipelineResult<(String, Vec<TranscriptSegment>)> {
    completed_transcripts(
        state,
        &[
            StepName::TranslateSubtitleTranscripts,
            StepName::TranslateVoiceTranscripts,
            StepName::RevisePdfTranscripts,
            StepName::ReviseTranscripts,
            StepName::GenerateTranscripts,
        ],
    )
    .ok_or_else(|| PipelineError::MissingPrerequisite {
        step,
        detail: "no completed transcripts for subtitles".to_string(),
    })
}

/// Short locale code for a language name (`english` → `en`).
#[must_use]
pub fn locale_code(language: &str) -> String {
    match language.trim().to_ascii_lowercase().as_str() {
        "english" | "en" => "en".to_string(),
        "chinese" | "mandarin" | "zh" => "zh".to_string(),
        "japanese" | "ja" => "ja".to_string(),
        "korean" | "ko" => "ko".to_string(),
        "spanish" | "es" => "es".to_string(),
        "french" | "fr" => "fr".to_string(),
        "german" | "de" => "de".to_string(),
        "italian" | "it" => "it".to_string(),
        "portuguese" | "pt" => "pt".to_string(),
        "thai" | "th" => "th".to_string(),
        other => {
            let code: String = other.chars().take(2).collect();
            if code.is_empty() {
                "en".to_string()
            } else {
                code
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_codes_cover_common_languages() {
        assert_eq!(locale_code("english"), "en");
        assert_eq!(locale_code("Spanish"), "es");
        assert_eq!(locale_code("zh"), "zh");
        assert_eq!(locale_code("klingon"), "kl");
        assert_eq!(locale_code(""), "en");
    }
}
