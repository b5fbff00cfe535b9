use ppt_core::{Checkpoint, Job, JsonFileStore, NullSink, PipelineConfig, Result, Stage, Store, VideoMap};
use ppt_pipeline::{record_ledger, Harvester, Orchestrator, Workspace};
use ppt_pptx::fixture::DeckBuilder;
use ppt_remote::{EditRequest, MemoryBackend, PageElement, PresentationEditor, RemoteServices};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const PREFIX: &str = "Spring";

fn deck(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("deck.pptx");
    DeckBuilder::new(6)
        .with_video_on(2)
        .with_video_on(5)
        .with_large_photo()
        .write(&path)
        .unwrap();
    path
}

fn jobs() -> Vec<Job> {
    let mut first = Job::new("job-1", "Part One", 1, 3);
    first.category = "Teaching".into();
    vec![first, Job::new("job-2", "Part Two", 4, 6)]
}

fn orchestrator(root: &Path, backend: &Arc<MemoryBackend>, config: PipelineConfig) -> Orchestrator {
    Orchestrator::new(Workspace::new(root), RemoteServices::from_backend(backend.clone()), config)
        .with_prefix(PREFIX)
        .with_sink(Box::new(NullSink))
}

fn links(jobs: &[Job]) -> Vec<Option<String>> {
    jobs.iter().map(|j| j.result.final_link.clone()).collect()
}

fn recorded_stage(ws: &Workspace) -> Stage {
    JsonFileStore::<Checkpoint>::new(ws.checkpoint()).load().unwrap().stage
}

/// Refuses every edit, standing in for an interruption after the split.
struct FailingEditor;

impl PresentationEditor for FailingEditor {
    fn page_elements(&self, _presentation_id: &str) -> Result<Vec<PageElement>> {
        Err(ppt_core::Error::remote("slides", "connection reset"))
    }

    fn batch_update(&self, _presentation_id: &str, _requests: &[EditRequest]) -> Result<()> {
        Err(ppt_core::Error::remote("slides", "connection reset"))
    }
}

#[test]
fn test_full_run_publishes_embeds_and_logs() {
    let dir = tempfile::tempdir().unwrap();
    let source = deck(&dir);
    let backend = Arc::new(MemoryBackend::new());
    let orch = orchestrator(&dir.path().join("work"), &backend, PipelineConfig::default());

    let report = orch.run(&source, jobs()).unwrap();
    assert!(report.is_finished());
    assert_eq!(report.resumed_from, Stage::None);
    assert_eq!(report.stages_run.len(), 6);
    assert!(report.jobs.iter().all(|j| j.is_published() && j.result.logged_to_sheet));

    assert_eq!(backend.uploads(), 2);
    assert_eq!(backend.conversions(), 2);
    assert_eq!(backend.rows().len(), 2);
    // One video per job, each swapped in with one create and one delete.
    let batches = backend.batches();
    assert_eq!(batches.len(), 2);
    assert!(batches.iter().all(|(_, requests)| requests.len() == 2));

    let ws = orch.workspace();
    assert_eq!(recorded_stage(ws), Stage::LoggedDone);
    assert!(ws.slim().exists());
    assert!(!ws.split("job-1").exists());
    assert!(!ws.media_dir().join("media1.mp4").exists());
}

#[test]
fn test_second_run_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let source = deck(&dir);
    let backend = Arc::new(MemoryBackend::new());
    let orch = orchestrator(&dir.path().join("work"), &backend, PipelineConfig::default());

    let first = orch.run(&source, jobs()).unwrap();
    let second = orch.run(&source, jobs()).unwrap();

    assert_eq!(second.resumed_from, Stage::LoggedDone);
    assert!(second.stages_run.is_empty());
    assert_eq!(links(&first.jobs), links(&second.jobs));
    assert_eq!(backend.uploads(), 2);
    assert_eq!(backend.conversions(), 2);
    assert_eq!(backend.rows().len(), 2);
}

#[test]
fn test_harvest_twice_uploads_once() {
    let dir = tempfile::tempdir().unwrap();
    let source = deck(&dir);
    let backend = MemoryBackend::new();
    let ws = Workspace::new(dir.path().join("work"));
    let map_store: JsonFileStore<VideoMap> = JsonFileStore::new(ws.video_map(PREFIX));
    let media_dir = ws.media_dir();
    let harvester = Harvester {
        store: &backend,
        map_store: &map_store,
        prefix: PREFIX,
        media_dir: &media_dir,
    };

    let first = harvester.run(&source, &NullSink).unwrap();
    assert_eq!(first.uploaded, 2);
    assert_eq!(first.map.len(), 2);
    assert!(first.map.lookup("media1.mp4").is_found());

    let second = harvester.run(&source, &NullSink).unwrap();
    assert_eq!(second.uploaded, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.map, first.map);
    assert_eq!(backend.uploads(), 2);
    assert_eq!(backend.permission_grants(), 2);
}

#[test]
fn test_harvest_reuses_remote_upload_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let source = deck(&dir);
    let backend = MemoryBackend::new();
    let existing = backend.insert_file("[Spring]_media2.mp4");

    let ws = Workspace::new(dir.path().join("work"));
    let map_store: JsonFileStore<VideoMap> = JsonFileStore::new(ws.video_map(PREFIX));
    let media_dir = ws.media_dir();
    let report = Harvester {
        store: &backend,
        map_store: &map_store,
        prefix: PREFIX,
        media_dir: &media_dir,
    }
    .run(&source, &NullSink)
    .unwrap();

    assert_eq!(report.uploaded, 1);
    assert_eq!(report.reused, 1);
    assert_eq!(report.map.lookup("media2.mp4").found(), Some(existing.url.as_str()));
    assert!(backend.is_public(&existing.id));
    // Persisted after every video.
    assert_eq!(map_store.load().unwrap(), report.map);
}

#[test]
fn test_resume_after_split_goes_straight_to_embed() {
    let dir = tempfile::tempdir().unwrap();
    let source = deck(&dir);
    let root = dir.path().join("work");

    let backend = Arc::new(MemoryBackend::new());
    let mut services = RemoteServices::from_backend(backend.clone());
    services.editor = Arc::new(FailingEditor);
    let interrupted = Orchestrator::new(Workspace::new(&root), services, PipelineConfig::default())
        .with_prefix(PREFIX)
        .with_sink(Box::new(NullSink));
    assert!(interrupted.run(&source, jobs()).is_err());
    assert_eq!(recorded_stage(interrupted.workspace()), Stage::SplitDone);

    let resumed = orchestrator(&root, &backend, PipelineConfig::default())
        .run(&source, jobs())
        .unwrap();
    assert_eq!(resumed.resumed_from, Stage::SplitDone);
    assert_eq!(resumed.stages_run, vec![Stage::EmbedDone, Stage::LoggedDone]);
    assert_eq!(backend.uploads(), 2);
    assert_eq!(backend.conversions(), 2);
    assert_eq!(backend.batches().len(), 2);

    // Same links as an uninterrupted run on identical input.
    let other = tempfile::tempdir().unwrap();
    let fresh_backend = Arc::new(MemoryBackend::new());
    let uninterrupted = orchestrator(&other.path().join("work"), &fresh_backend, PipelineConfig::default())
        .run(&source, jobs())
        .unwrap();
    assert_eq!(links(&resumed.jobs), links(&uninterrupted.jobs));
}

#[test]
fn test_oversized_job_halts_before_embed() {
    let dir = tempfile::tempdir().unwrap();
    let source = deck(&dir);
    let root = dir.path().join("work");
    let backend = Arc::new(MemoryBackend::new());

    let tiny = PipelineConfig {
        max_upload_bytes: 1024,
        ..PipelineConfig::default()
    };
    let report = orchestrator(&root, &backend, tiny).run(&source, jobs()).unwrap();
    assert!(report.halted_oversized());
    assert_eq!(report.oversized, vec!["job-1".to_string(), "job-2".to_string()]);
    assert_eq!(report.completed, Stage::ShrinkDone);
    assert!(report.jobs.iter().all(|j| j.result.error_too_large && !j.is_published()));
    assert_eq!(backend.conversions(), 0);
    assert!(backend.batches().is_empty());
    assert!(backend.rows().is_empty());

    let ws = Workspace::new(&root);
    assert_eq!(recorded_stage(&ws), Stage::ShrinkDone);
    let saved = JsonFileStore::<Vec<Job>>::new(ws.results()).load().unwrap();
    assert!(saved[0].result.size_mb.is_some_and(|mb| mb > 0.0));

    // With the limit lifted the split is evaluated again.
    let retry = orchestrator(&root, &backend, PipelineConfig::default())
        .run(&source, jobs())
        .unwrap();
    assert_eq!(retry.resumed_from, Stage::ShrinkDone);
    assert!(retry.is_finished());
    assert!(retry.jobs.iter().all(|j| !j.result.error_too_large && j.is_published()));
}

#[test]
fn test_changed_source_starts_over_but_reuses_remote_state() {
    let dir = tempfile::tempdir().unwrap();
    let source = deck(&dir);
    let root = dir.path().join("work");
    let backend = Arc::new(MemoryBackend::new());

    orchestrator(&root, &backend, PipelineConfig::default())
        .run(&source, jobs())
        .unwrap();

    DeckBuilder::new(7)
        .with_video_on(2)
        .with_video_on(5)
        .write(&source)
        .unwrap();
    let report = orchestrator(&root, &backend, PipelineConfig::default())
        .run(&source, jobs())
        .unwrap();

    assert_eq!(report.resumed_from, Stage::None);
    assert!(report.is_finished());
    // Videos come from the kept map, presentations are found by name and
    // the ledger already holds both ids.
    assert_eq!(backend.uploads(), 2);
    assert_eq!(backend.conversions(), 2);
    assert_eq!(backend.rows().len(), 2);
}

#[test]
fn test_ledger_dedup_across_runs() {
    let backend = MemoryBackend::new();
    let mut job = Job::new("job-1", "Part One", 1, 3);
    job.result.final_link = Some("https://docs.google.com/presentation/d/x/edit".into());

    let first = record_ledger(&backend, std::slice::from_mut(&mut job), "admins").unwrap();
    assert_eq!(first.appended, 1);

    let mut again = Job::new("job-1", "Part One", 1, 3);
    again.result.final_link = job.result.final_link.clone();
    let second = record_ledger(&backend, std::slice::from_mut(&mut again), "admins").unwrap();
    assert_eq!(second.appended, 0);
    assert_eq!(second.already_present, 1);
    assert!(again.result.logged_to_sheet);
    assert_eq!(backend.rows().len(), 1);
}

#[test]
fn test_deleted_checkpoint_repeats_stages_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let source = deck(&dir);
    let root = dir.path().join("work");
    let backend = Arc::new(MemoryBackend::new());

    orchestrator(&root, &backend, PipelineConfig::default())
        .run(&source, jobs())
        .unwrap();
    std::fs::remove_file(Workspace::new(&root).checkpoint()).unwrap();

    let report = orchestrator(&root, &backend, PipelineConfig::default())
        .run(&source, jobs())
        .unwrap();
    assert_eq!(report.stages_run.len(), 6);
    assert_eq!(backend.uploads(), 2);
    assert_eq!(backend.conversions(), 2);
    // Placeholders were already swapped, so no further edits.
    assert_eq!(backend.batches().len(), 2);
    assert_eq!(backend.rows().len(), 2);
}

#[test]
fn test_duplicate_job_ids_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let source = deck(&dir);
    let backend = Arc::new(MemoryBackend::new());
    let orch = orchestrator(&dir.path().join("work"), &backend, PipelineConfig::default());

    let jobs = vec![Job::new("same", "Part One", 1, 3), Job::new("same", "Part Two", 4, 6)];
    let err = orch.run(&source, jobs).unwrap_err();
    assert!(matches!(err, ppt_core::Error::InvalidJob(_)));
    assert_eq!(backend.uploads(), 0);
    assert_eq!(backend.conversions(), 0);
    assert!(!orch.workspace().checkpoint().exists());
}
