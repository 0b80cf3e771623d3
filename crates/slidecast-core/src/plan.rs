//! Step-plan materialization.
//!
//! The enabled step set for a task is computed exactly once, at state
//! creation, from the source type and the task knobs. Language-conditional
//! steps are omitted when no translation is needed; feature-flagged steps
//! (subtitles, visual analysis, avatar clips) are kept in the plan as
//! `skipped` so progress views stay stable if the flags change later.

use serde::{Deserialize, Serialize};

use crate::status::StepStatus;
use crate::step::StepName;
use crate::task::{SourceType, TaskKnobs, TaskType};

/// Process-wide toggles that influence planning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOptions {
    /// Whether the vision engine is available for slide analysis.
    pub visual_analysis_enabled: bool,
}

/// One planned step with its initial status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStep {
    /// The step to run.
    pub name: StepName,
    /// `pending`, or `skipped` when disabled by a feature flag.
    pub initial: StepStatus,
}

impl PlannedStep {
    const fn pending(name: StepName) -> Self {
        Self {
            name,
            initial: StepStatus::Pending,
        }
    }

    const fn gated(name: StepName, enabled: bool) -> Self {
        Self {
            name,
            initial: if enabled {
                StepStatus::Pending
            } else {
                StepStatus::Skipped
            },
        }
    }
}

/// Ordered, language-resolved step list for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPlan {
    steps: Vec<PlannedStep>,
}

impl StepPlan {
    /// Build the plan for a task from its source type and knobs.
    #[must_use]
    pub fn for_task(source: SourceType, knobs: &TaskKnobs, options: &PlanOptions) -> Self {
        if knobs.task_type() == TaskType::FilePurge {
            return Self::for_purge();
        }
        match source {
            SourceType::Pdf | SourceType::Audio => Self::for_pdf(knobs),
            SourceType::Slides => Self::for_slides(knobs, options),
        }
    }

    /// Plan for the synthetic file-purge task.
    #[must_use]
    pub fn for_purge() -> Self {
        Self {
            steps: vec![PlannedStep::pending(StepName::PurgeTaskFiles)],
        }
    }

    fn for_pdf(knobs: &TaskKnobs) -> Self {
        let mut steps = vec![PlannedStep::pending(StepName::SegmentPdfContent)];

        if knobs.generate_video {
            steps.push(PlannedStep::pending(StepName::RevisePdfTranscripts));
            if knobs.needs_voice_translation() {
                steps.push(PlannedStep::pending(StepName::TranslateVoiceTranscripts));
            }
            if knobs.needs_subtitle_translation() {
                steps.push(PlannedStep::pending(StepName::TranslateSubtitleTranscripts));
            }
            steps.push(PlannedStep::pending(StepName::GeneratePdfChapterImages));
            steps.push(PlannedStep::pending(StepName::GeneratePdfAudio));
            steps.push(PlannedStep::gated(
                StepName::GeneratePdfSubtitles,
                knobs.generate_subtitles,
            ));
            steps.push(PlannedStep::pending(StepName::ComposeVideo));
        }

        if knobs.generate_podcast {
            steps.push(PlannedStep::pending(StepName::GeneratePodcastScript));
            if knobs.needs_podcast_translation() {
                steps.push(PlannedStep::pending(StepName::TranslatePodcastScript));
            }
            steps.push(PlannedStep::pending(StepName::GeneratePodcastAudio));
            steps.push(PlannedStep::pending(StepName::GeneratePodcastSubtitles));
            steps.push(PlannedStep::pending(StepName::ComposePodcast));
        }

        Self { steps }
    }

    fn for_slides(knobs: &TaskKnobs, options: &PlanOptions) -> Self {
        let mut steps = vec![
            PlannedStep::pending(StepName::ExtractSlides),
            PlannedStep::pending(StepName::ConvertSlidesToImages),
            PlannedStep::gated(
                StepName::AnalyzeSlideImages,
                options.visual_analysis_enabled,
            ),
            PlannedStep::pending(StepName::GenerateTranscripts),
            PlannedStep::pending(StepName::ReviseTranscripts),
        ];
        if knobs.needs_voice_translation() {
            steps.push(PlannedStep::pending(StepName::TranslateVoiceTranscripts));
        }
        if knobs.needs_subtitle_translation() {
            steps.push(PlannedStep::pending(StepName::TranslateSubtitleTranscripts));
        }
        steps.push(PlannedStep::pending(StepName::GenerateAudio));
        steps.push(PlannedStep::gated(
            StepName::GenerateAvatarVideos,
            knobs.generate_avatar,
        ));
        steps.push(PlannedStep::pending(StepName::GenerateSubtitles));
        steps.push(PlannedStep::pending(StepName::ComposeVideo));
        Self { steps }
    }

    /// The planned steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    /// Names only, in execution order.
    pub fn step_names(&self) -> impl Iterator<Item = StepName> + '_ {
        self.steps.iter().map(|planned| planned.name)
    }

    /// First step that is not pre-skipped.
    #[must_use]
    pub fn first_runnable(&self) -> Option<StepName> {
        self.steps
            .iter()
            .find(|planned| planned.initial == StepStatus::Pending)
            .map(|planned| planned.name)
    }

    /// Steps the video portion of a `both` task executes, in order.
    #[must_use]
    pub fn video_portion(&self) -> Vec<StepName> {
        self.steps
            .iter()
            .map(|planned| planned.name)
            .filter(|name| !is_podcast_step(*name))
            .collect()
    }

    /// Steps the podcast portion of a `both` task executes, in order.
    /// `segment_pdf_content` is shared with the video portion and included
    /// here so a podcast-only re-entry still satisfies its prerequisite.
    #[must_use]
    pub fn podcast_portion(&self) -> Vec<StepName> {
        self.steps
            .iter()
            .map(|planned| planned.name)
            .filter(|name| *name == StepName::SegmentPdfContent || is_podcast_step(*name))
            .collect()
    }
}

const fn is_podcast_step(name: StepName) -> bool {
    matches!(
        name,
        StepName::GeneratePodcastScript
            | StepName::TranslatePodcastScript
            | StepName::GeneratePodcastAudio
            | StepName::GeneratePodcastSubtitles
            | StepName::ComposePodcast
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(plan: &StepPlan) -> Vec<StepName> {
        plan.step_names().collect()
    }

    #[test]
    fn english_pdf_video_plan_has_no_translation_steps() {
        let knobs = TaskKnobs::default();
        let plan = StepPlan::for_task(SourceType::Pdf, &knobs, &PlanOptions::default());
        assert_eq!(
            names(&plan),
            vec![
                StepName::SegmentPdfContent,
                StepName::RevisePdfTranscripts,
                StepName::GeneratePdfChapterImages,
                StepName::GeneratePdfAudio,
                StepName::GeneratePdfSubtitles,
                StepName::ComposeVideo,
            ]
        );
    }

    #[test]
    fn translated_pdf_video_plan_inserts_translation_after_revision() {
        let knobs = TaskKnobs {
            voice_language: "spanish".to_string(),
            subtitle_language: Some("japanese".to_string()),
            ..TaskKnobs::default()
        };
        let plan = StepPlan::for_task(SourceType::Pdf, &knobs, &PlanOptions::default());
        let all = names(&plan);
        let revise = all
            .iter()
            .position(|s| *s == StepName::RevisePdfTranscripts)
            .unwrap();
        let voice = all
            .iter()
            .position(|s| *s == StepName::TranslateVoiceTranscripts)
            .unwrap();
        let subtitle = all
            .iter()
            .position(|s| *s == StepName::TranslateSubtitleTranscripts)
            .unwrap();
        let images = all
            .iter()
            .position(|s| *s == StepName::GeneratePdfChapterImages)
            .unwrap();
        assert!(revise < voice && voice < subtitle && subtitle < images);
    }

    #[test]
    fn podcast_plan_shares_segmentation_and_skips_video_steps() {
        let knobs = TaskKnobs {
            generate_video: false,
            generate_podcast: true,
            transcript_language: Some("spanish".to_string()),
            ..TaskKnobs::default()
        };
        let plan = StepPlan::for_task(SourceType::Pdf, &knobs, &PlanOptions::default());
        assert_eq!(
            names(&plan),
            vec![
                StepName::SegmentPdfContent,
                StepName::GeneratePodcastScript,
                StepName::TranslatePodcastScript,
                StepName::GeneratePodcastAudio,
                StepName::GeneratePodcastSubtitles,
                StepName::ComposePodcast,
            ]
        );
    }

    #[test]
    fn both_plan_runs_video_first_then_podcast() {
        let knobs = TaskKnobs {
            generate_podcast: true,
            ..TaskKnobs::default()
        };
        let plan = StepPlan::for_task(SourceType::Pdf, &knobs, &PlanOptions::default());
        let all = names(&plan);
        let compose_video = all.iter().position(|s| *s == StepName::ComposeVideo).unwrap();
        let script = all
            .iter()
            .position(|s| *s == StepName::GeneratePodcastScript)
            .unwrap();
        assert!(compose_video < script);
        assert_eq!(
            all.iter()
                .filter(|s| **s == StepName::SegmentPdfContent)
                .count(),
            1
        );

        let video = plan.video_portion();
        let podcast = plan.podcast_portion();
        assert!(video.contains(&StepName::ComposeVideo));
        assert!(!video.contains(&StepName::ComposePodcast));
        assert_eq!(podcast.first(), Some(&StepName::SegmentPdfContent));
        assert_eq!(podcast.last(), Some(&StepName::ComposePodcast));
    }

    #[test]
    fn slide_plan_gates_flagged_steps() {
        let knobs = TaskKnobs::default();
        let plan = StepPlan::for_task(SourceType::Slides, &knobs, &PlanOptions::default());
        let analyze = plan
            .steps()
            .iter()
            .find(|p| p.name == StepName::AnalyzeSlideImages)
            .unwrap();
        assert_eq!(analyze.initial, StepStatus::Skipped);
        let avatar = plan
            .steps()
            .iter()
            .find(|p| p.name == StepName::GenerateAvatarVideos)
            .unwrap();
        assert_eq!(avatar.initial, StepStatus::Skipped);
        assert_eq!(plan.first_runnable(), Some(StepName::ExtractSlides));

        let plan = StepPlan::for_task(
            SourceType::Slides,
            &knobs,
            &PlanOptions {
                visual_analysis_enabled: true,
            },
        );
        let analyze = plan
            .steps()
            .iter()
            .find(|p| p.name == StepName::AnalyzeSlideImages)
            .unwrap();
        assert_eq!(analyze.initial, StepStatus::Pending);
    }

    #[test]
    fn purge_plan_is_a_single_step() {
        let plan = StepPlan::for_purge();
        assert_eq!(names(&plan), vec![StepName::PurgeTaskFiles]);
    }
}
