//! End-to-end coordinator scenarios over the in-memory substrate, local
//! storage, and stub engines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use slidecast_core::{
    PlanOptions, SourceType, StepName, StepStatus, TaskKnobs, TaskStatus, TaskType,
};
use slidecast_pipeline::{
    stub_engines, AcceptTask, Coordinator, PipelineContext, PipelineError, PipelineStep,
    StepContext, StepOutput, StepRegistry,
};
use slidecast_pipeline::artifacts::downloads_for_state;
use slidecast_pipeline::engines::EngineError;
use slidecast_queue::{PurgeRequest, TaskQueue};
use slidecast_state::{KeyValue, MemoryKv, StateStore};
use slidecast_storage::paths::upload_object_key;
use slidecast_storage::{LocalStorage, StorageProvider};

struct Fixture {
    kv: Arc<MemoryKv>,
    state: StateStore,
    queue: TaskQueue,
    storage: Arc<LocalStorage>,
    _dir: tempfile::TempDir,
    source_path: std::path::PathBuf,
}

impl Fixture {
    async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = Arc::new(MemoryKv::new());
        let state = StateStore::new(kv.clone());
        let queue = TaskQueue::new(kv.clone());
        let storage = Arc::new(LocalStorage::new(dir.path().join("storage")));
        let source_path = dir.path().join("paper.pdf");
        tokio::fs::write(&source_path, b"%PDF-1.4 slidecast test document")
            .await
            .expect("write source");
        Self {
            kv,
            state,
            queue,
            storage,
            source_path,
            _dir: dir,
        }
    }

    fn context(&self) -> PipelineContext {
        PipelineContext {
            state: self.state.clone(),
            queue: self.queue.clone(),
            storage: self.storage.clone(),
            engines: stub_engines(),
            output_dir: self.storage.path_for(""),
            plan_options: PlanOptions::default(),
        }
    }

    fn accept(&self, task_id: Uuid, knobs: TaskKnobs) -> AcceptTask {
        AcceptTask {
            file_id: "abcd1234abcd1234".to_string(),
            file_path: Some(self.source_path.display().to_string()),
            file_ext: Some(".pdf".to_string()),
            filename: Some("paper.pdf".to_string()),
            source_type: SourceType::Pdf,
            task_type: knobs.task_type(),
            knobs,
            task_id: Some(task_id),
            user_id: Some("user-1".to_string()),
            purge: None,
        }
    }
}

type Counts = Arc<Mutex<HashMap<StepName, u32>>>;

struct CountingStep {
    inner: Arc<dyn PipelineStep>,
    counts: Counts,
}

#[async_trait]
impl PipelineStep for CountingStep {
    fn name(&self) -> StepName {
        self.inner.name()
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, PipelineError> {
        {
            let mut counts = self.counts.lock().expect("counts lock");
            *counts.entry(self.inner.name()).or_insert(0) += 1;
        }
        self.inner.run(ctx).await
    }
}

fn counting_registry(counts: &Counts) -> StepRegistry {
    let mut registry = StepRegistry::new();
    for step in slidecast_pipeline::steps::all_steps() {
        registry.register(Arc::new(CountingStep {
            inner: step,
            counts: counts.clone(),
        }));
    }
    registry
}

fn count(counts: &Counts, step: StepName) -> u32 {
    *counts.lock().expect("counts lock").get(&step).unwrap_or(&0)
}

#[tokio::test]
async fn english_pdf_video_runs_to_completion() {
    let fixture = Fixture::new().await;
    let coordinator = Coordinator::new(fixture.context());
    let task_id = Uuid::new_v4();

    coordinator
        .accept_task(fixture.accept(task_id, TaskKnobs::default()))
        .await
        .expect("pipeline");

    let state = fixture
        .state
        .get_state_by_task(task_id)
        .await
        .expect("load")
        .expect("state");
    assert_eq!(state.status, TaskStatus::Completed);
    assert_eq!(state.progress_percent(), 100);

    // Translation steps are absent from an all-English plan.
    assert!(state.step(StepName::TranslateVoiceTranscripts).is_none());
    assert!(state.step(StepName::TranslateSubtitleTranscripts).is_none());
    for step in [
        StepName::SegmentPdfContent,
        StepName::RevisePdfTranscripts,
        StepName::GeneratePdfChapterImages,
        StepName::GeneratePdfAudio,
        StepName::GeneratePdfSubtitles,
        StepName::ComposeVideo,
    ] {
        assert_eq!(state.step(step).unwrap().status, StepStatus::Completed);
    }

    // Artifacts: video, audio, en subtitles in both formats, markdown.
    let base = task_id.to_string();
    for key in [
        format!("outputs/{base}/video/final.mp4"),
        format!("outputs/{base}/audio/final.mp3"),
        format!("outputs/{base}/subtitles/final_en.vtt"),
        format!("outputs/{base}/subtitles/final_en.srt"),
        format!("outputs/{base}/transcripts/transcript.md"),
    ] {
        assert!(
            fixture.storage.exists(&key).await.expect("probe"),
            "missing artifact {key}"
        );
    }

    let downloads = downloads_for_state(&state);
    assert!(downloads.iter().any(|entry| entry.kind == "video"));
    assert!(downloads.iter().any(|entry| entry.kind == "audio"));
    assert!(downloads
        .iter()
        .any(|entry| entry.kind == "subtitles" && entry.label == "en"));
    assert!(downloads
        .iter()
        .any(|entry| entry.kind == "transcripts" && entry.label == "markdown"));
}

#[tokio::test]
async fn translated_podcast_produces_spanish_transcript() {
    let fixture = Fixture::new().await;
    let coordinator = Coordinator::new(fixture.context());
    let task_id = Uuid::new_v4();
    let knobs = TaskKnobs {
        generate_video: false,
        generate_podcast: true,
        transcript_language: Some("spanish".to_string()),
        ..TaskKnobs::default()
    };

    coordinator
        .accept_task(fixture.accept(task_id, knobs))
        .await
        .expect("pipeline");

    let state = fixture
        .state
        .get_state_by_task(task_id)
        .await
        .expect("load")
        .expect("state");
    assert_eq!(state.status, TaskStatus::Completed);
    assert_eq!(state.task_type, TaskType::Podcast);
    assert!(state.step(StepName::ComposeVideo).is_none());
    for step in [
        StepName::SegmentPdfContent,
        StepName::GeneratePodcastScript,
        StepName::TranslatePodcastScript,
        StepName::GeneratePodcastAudio,
        StepName::GeneratePodcastSubtitles,
        StepName::ComposePodcast,
    ] {
        assert_eq!(state.step(step).unwrap().status, StepStatus::Completed);
    }

    let base = task_id.to_string();
    assert!(fixture
        .storage
        .exists(&format!("outputs/{base}/podcast/final.mp3"))
        .await
        .expect("probe"));
    let transcript = fixture
        .storage
        .get_bytes(&format!("outputs/{base}/transcripts/podcast.json"))
        .await
        .expect("transcript json");
    let doc: serde_json::Value = serde_json::from_slice(&transcript).expect("json");
    assert_eq!(doc["language"], "spanish");
}

#[tokio::test]
async fn rerunning_a_completed_task_invokes_no_steps() {
    let fixture = Fixture::new().await;
    let counts: Counts = Arc::new(Mutex::new(HashMap::new()));
    let coordinator =
        Coordinator::with_registry(fixture.context(), counting_registry(&counts));
    let task_id = Uuid::new_v4();

    coordinator
        .accept_task(fixture.accept(task_id, TaskKnobs::default()))
        .await
        .expect("first run");
    assert_eq!(count(&counts, StepName::SegmentPdfContent), 1);

    coordinator
        .accept_task(fixture.accept(task_id, TaskKnobs::default()))
        .await
        .expect("second run");
    for step in [
        StepName::SegmentPdfContent,
        StepName::RevisePdfTranscripts,
        StepName::GeneratePdfAudio,
        StepName::ComposeVideo,
    ] {
        assert_eq!(count(&counts, step), 1, "step {step} re-ran");
    }
}

/// Step that raises the cancellation flag mid-execution, then observes it.
struct SelfCancellingStep {
    kv: Arc<MemoryKv>,
    task_id: Uuid,
}

#[async_trait]
impl PipelineStep for SelfCancellingStep {
    fn name(&self) -> StepName {
        StepName::GeneratePdfAudio
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, PipelineError> {
        // First unit finishes, then the user cancels, then the probe fires.
        self.kv
            .set(&format!("ss:task:{}:cancelled", self.task_id), "1", None)
            .await
            .expect("set cancel flag");
        ctx.check_cancelled().await?;
        unreachable!("probe must observe the flag");
    }
}

#[tokio::test]
async fn cancellation_mid_step_halts_the_pipeline() {
    let fixture = Fixture::new().await;
    let task_id = Uuid::new_v4();
    let mut registry = StepRegistry::standard();
    registry.register(Arc::new(SelfCancellingStep {
        kv: fixture.kv.clone(),
        task_id,
    }));
    let coordinator = Coordinator::with_registry(fixture.context(), registry);

    let error = coordinator
        .accept_task(fixture.accept(task_id, TaskKnobs::default()))
        .await
        .expect_err("cancelled");
    assert!(error.is_cancelled());

    let state = fixture
        .state
        .get_state_by_task(task_id)
        .await
        .expect("load")
        .expect("state");
    assert_eq!(state.status, TaskStatus::Cancelled);
    assert_eq!(
        state.step(StepName::GeneratePdfAudio).unwrap().status,
        StepStatus::Cancelled
    );
    // Steps before the cancellation point keep their results.
    assert_eq!(
        state.step(StepName::SegmentPdfContent).unwrap().status,
        StepStatus::Completed
    );
    // Later steps never ran.
    assert_eq!(
        state.step(StepName::ComposeVideo).unwrap().status,
        StepStatus::Cancelled
    );
    assert!(state.progress_percent() < 100);
    // Cancellation is not an error: no error entries were recorded.
    assert!(state.errors.is_empty());
}

/// Speech step that fails hard exactly once.
struct FlakyAudioStep {
    inner: Arc<dyn PipelineStep>,
    failed_once: Arc<AtomicBool>,
}

#[async_trait]
impl PipelineStep for FlakyAudioStep {
    fn name(&self) -> StepName {
        StepName::GeneratePdfAudio
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutput, PipelineError> {
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::Engine(EngineError::Fatal {
                op: "synthesize",
                detail: "voice service rejected the request".to_string(),
            }));
        }
        self.inner.run(ctx).await
    }
}

#[tokio::test]
async fn retry_resumes_from_the_failed_step() {
    let fixture = Fixture::new().await;
    let counts: Counts = Arc::new(Mutex::new(HashMap::new()));
    let mut registry = counting_registry(&counts);
    let real_audio = slidecast_pipeline::steps::all_steps()
        .into_iter()
        .find(|step| step.name() == StepName::GeneratePdfAudio)
        .expect("audio step");
    registry.register(Arc::new(CountingStep {
        inner: Arc::new(FlakyAudioStep {
            inner: real_audio,
            failed_once: Arc::new(AtomicBool::new(false)),
        }),
        counts: counts.clone(),
    }));
    let coordinator = Coordinator::with_registry(fixture.context(), registry);
    let task_id = Uuid::new_v4();

    let error = coordinator
        .accept_task(fixture.accept(task_id, TaskKnobs::default()))
        .await
        .expect_err("first run fails");
    assert!(!error.is_cancelled());

    let state = fixture
        .state
        .get_state_by_task(task_id)
        .await
        .expect("load")
        .expect("state");
    assert_eq!(state.status, TaskStatus::Failed);
    assert_eq!(
        state.step(StepName::GeneratePdfAudio).unwrap().status,
        StepStatus::Failed
    );
    assert_eq!(state.errors.len(), 1);
    assert_eq!(state.errors[0].step, StepName::GeneratePdfAudio);

    // The retry flow: resolve the resume step, reset, re-run.
    let resume = state.resume_step(None).expect("resume step");
    assert_eq!(resume, StepName::GeneratePdfAudio);
    fixture
        .state
        .reset_steps_from_task(task_id, resume)
        .await
        .expect("reset")
        .expect("state");

    coordinator
        .accept_task(fixture.accept(task_id, TaskKnobs::default()))
        .await
        .expect("second run completes");

    let state = fixture
        .state
        .get_state_by_task(task_id)
        .await
        .expect("load")
        .expect("state");
    assert_eq!(state.status, TaskStatus::Completed);
    assert!(state.errors.is_empty());

    // Earlier artifacts were not re-generated.
    assert_eq!(count(&counts, StepName::SegmentPdfContent), 1);
    assert_eq!(count(&counts, StepName::RevisePdfTranscripts), 1);
    assert_eq!(count(&counts, StepName::GeneratePdfChapterImages), 1);
    // The audio step was attempted twice: the hard failure and the retry.
    assert_eq!(count(&counts, StepName::GeneratePdfAudio), 2);
}

#[tokio::test]
async fn both_variant_shares_segmentation_between_video_and_podcast() {
    let fixture = Fixture::new().await;
    let counts: Counts = Arc::new(Mutex::new(HashMap::new()));
    let coordinator =
        Coordinator::with_registry(fixture.context(), counting_registry(&counts));
    let task_id = Uuid::new_v4();
    let knobs = TaskKnobs {
        generate_podcast: true,
        ..TaskKnobs::default()
    };

    coordinator
        .accept_task(fixture.accept(task_id, knobs))
        .await
        .expect("pipeline");

    assert_eq!(count(&counts, StepName::SegmentPdfContent), 1);

    let state = fixture
        .state
        .get_state_by_task(task_id)
        .await
        .expect("load")
        .expect("state");
    assert_eq!(state.task_type, TaskType::Both);
    let downloads = downloads_for_state(&state);
    assert!(downloads.iter().any(|entry| entry.kind == "video"));
    assert!(downloads.iter().any(|entry| entry.kind == "podcast"));
}

#[tokio::test]
async fn purge_removes_all_task_and_upload_objects() {
    let fixture = Fixture::new().await;
    let coordinator = Coordinator::new(fixture.context());
    let task_id = Uuid::new_v4();
    let file_id = "abcd1234abcd1234";

    // Seed the uploaded source object the way the upload endpoint does.
    let upload_key = upload_object_key(file_id, ".pdf");
    fixture
        .storage
        .put_bytes(b"%PDF-1.4", &upload_key, "application/pdf")
        .await
        .expect("seed upload");

    coordinator
        .accept_task(fixture.accept(task_id, TaskKnobs::default()))
        .await
        .expect("video pipeline");
    let video_key = format!("outputs/{task_id}/video/final.mp4");
    assert!(fixture.storage.exists(&video_key).await.expect("probe"));

    // Delete flow: unbind, then run the purge task.
    let remaining = fixture
        .state
        .unbind_task(file_id, task_id)
        .await
        .expect("unbind");
    assert_eq!(remaining, 0);

    let purge_task = Uuid::new_v4();
    let purge = AcceptTask {
        file_id: file_id.to_string(),
        file_path: None,
        file_ext: Some(".pdf".to_string()),
        filename: None,
        source_type: SourceType::Pdf,
        task_type: TaskType::FilePurge,
        knobs: TaskKnobs::default(),
        task_id: Some(purge_task),
        user_id: None,
        purge: Some(PurgeRequest {
            target_task_id: Some(task_id),
            storage_keys: Vec::new(),
            local_paths: Vec::new(),
        }),
    };
    coordinator.accept_task(purge).await.expect("purge pipeline");

    assert!(!fixture.storage.exists(&video_key).await.expect("probe"));
    assert!(!fixture.storage.exists(&upload_key).await.expect("probe"));
    assert!(fixture
        .storage
        .get_bytes(&video_key)
        .await
        .expect_err("gone")
        .is_not_found());

    // The purge task itself never re-binds the file's task set.
    let bound = fixture
        .state
        .task_ids_for_file(file_id)
        .await
        .expect("bound tasks");
    assert!(bound.is_empty());

    let purge_state = fixture
        .state
        .get_state_by_task(purge_task)
        .await
        .expect("load")
        .expect("purge state");
    assert_eq!(purge_state.status, TaskStatus::Completed);
}

#[tokio::test]
async fn cancelled_before_start_never_touches_steps() {
    let fixture = Fixture::new().await;
    let counts: Counts = Arc::new(Mutex::new(HashMap::new()));
    let coordinator =
        Coordinator::with_registry(fixture.context(), counting_registry(&counts));
    let task_id = Uuid::new_v4();

    fixture
        .kv
        .set(&format!("ss:task:{task_id}:cancelled"), "1", None)
        .await
        .expect("set cancel flag");

    let error = coordinator
        .accept_task(fixture.accept(task_id, TaskKnobs::default()))
        .await
        .expect_err("cancelled");
    assert!(error.is_cancelled());
    assert_eq!(count(&counts, StepName::SegmentPdfContent), 0);
}
