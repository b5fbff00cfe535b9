//! Checkpointed execution of the six pipeline stages.
//!
//! Each stage consumes the previous stage's artifact from the workspace.
//! A stage's completion is recorded in the checkpoint only after its
//! artifact has been written durably, so a failed or interrupted run can be
//! re-invoked and picks up after the last recorded stage.

use ppt_core::{
    Checkpoint, Error, Fingerprint, Job, JsonFileStore, LogSink, PipelineConfig, ProgressSink, Result, Stage,
    Store, VideoMap,
};
use ppt_pptx::ShrinkOptions;
use ppt_remote::RemoteServices;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::embed::embed_videos;
use crate::harvest::Harvester;
use crate::ledger::record_ledger;
use crate::publish::Publisher;
use crate::workspace::Workspace;

/// Outcome of one invocation.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Jobs with their latest results.
    pub jobs: Vec<Job>,
    /// Last stage already complete when the run started.
    pub resumed_from: Stage,
    /// Stages executed by this run, in order.
    pub stages_run: Vec<Stage>,
    /// Last stage durably complete when the run ended.
    pub completed: Stage,
    /// Ids of jobs rejected by the upload size gate.
    pub oversized: Vec<String>,
}

impl RunReport {
    /// Whether the run stopped early because a job was too large.
    pub fn halted_oversized(&self) -> bool {
        !self.oversized.is_empty()
    }

    /// Whether every stage is complete.
    pub fn is_finished(&self) -> bool {
        self.completed == Stage::LoggedDone
    }
}

/// Handle for cancelling a running pipeline at the next stage boundary.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Drives one source deck through every stage.
pub struct Orchestrator {
    workspace: Workspace,
    services: RemoteServices,
    config: PipelineConfig,
    prefix: String,
    sink: Box<dyn ProgressSink>,
    cancelled: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(workspace: Workspace, services: RemoteServices, config: PipelineConfig) -> Self {
        Self {
            workspace,
            services,
            config,
            prefix: String::new(),
            sink: Box::new(LogSink::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Display-name prefix for every upload.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    /// Run every stage not yet complete for `source`.
    ///
    /// `jobs` are merged with results persisted by earlier runs on the same
    /// source, so links obtained before an interruption are reused.
    pub fn run(&self, source: &Path, jobs: Vec<Job>) -> Result<RunReport> {
        let mut ids = HashSet::new();
        if let Some(dup) = jobs.iter().find(|j| !ids.insert(j.id.as_str())) {
            return Err(Error::InvalidJob(format!("duplicate job id '{}'", dup.id)));
        }
        self.workspace.ensure()?;
        let fingerprint = Fingerprint::of_file(source, self.config.fingerprint_window_bytes)?;

        let checkpoints: JsonFileStore<Checkpoint> = JsonFileStore::new(self.workspace.checkpoint());
        let results: JsonFileStore<Vec<Job>> = JsonFileStore::new(self.workspace.results());

        let checkpoint = checkpoints.load()?;
        if checkpoint.fingerprint.as_ref().is_some_and(|fp| fp != &fingerprint) {
            log::info!("Source changed since the last run, discarding previous artifacts");
            self.workspace.reset_artifacts()?;
        }

        let mut jobs = jobs;
        let previous = results.load()?;
        for job in jobs.iter_mut() {
            if let Some(prev) = previous.iter().find(|p| p.id == job.id) {
                job.adopt_outcome(prev);
            }
        }

        let resumed_from = self.resume_point(checkpoint.completed_for(&fingerprint), &jobs);
        if resumed_from == Stage::None {
            log::info!("Starting from scratch");
        } else {
            log::info!("Resuming after '{}'", resumed_from);
        }

        let mut report = RunReport {
            jobs,
            resumed_from,
            stages_run: Vec::new(),
            completed: resumed_from,
            oversized: Vec::new(),
        };

        let mut stage = resumed_from;
        while let Some(next) = stage.next() {
            if self.cancelled.load(Ordering::SeqCst) {
                log::warn!("Pipeline cancelled before '{}'", next);
                return Err(Error::Cancelled(next.label().to_string()));
            }

            log::info!("=== {} ===", next.label());
            self.run_stage(next, source, &results, &mut report)?;
            if report.halted_oversized() {
                log::error!(
                    "{} job(s) exceed the upload limit: {}. Shorten their slide ranges and run again.",
                    report.oversized.len(),
                    report.oversized.join(", ")
                );
                log::warn!(
                    "Halting before embedding and ledger logging for all jobs, including ones that \
                     uploaded fine; this is possibly a product-level bug"
                );
                return Ok(report);
            }

            checkpoints.save(&Checkpoint::reached(next, fingerprint.clone()))?;
            report.stages_run.push(next);
            report.completed = next;
            stage = next;
        }

        log::info!("All stages complete");
        Ok(report)
    }

    /// Where to start, given the last recorded stage and the current jobs.
    fn resume_point(&self, recorded: Stage, jobs: &[Job]) -> Stage {
        let mut stage = recorded;

        // Jobs added or left unpublished since the split need it again.
        if stage >= Stage::SplitDone && jobs.iter().any(|j| !j.is_published()) {
            log::info!("Some jobs are not published yet, repeating the split stage");
            stage = Stage::ShrinkDone;
        }
        if stage == Stage::LoggedDone && jobs.iter().any(|j| !j.result.logged_to_sheet) {
            stage = Stage::EmbedDone;
        }

        while stage != Stage::None && !self.artifact_exists(stage) {
            log::warn!("Artifact of '{}' is missing, repeating that stage", stage);
            stage = stage.previous().unwrap_or(Stage::None);
        }
        stage
    }

    fn artifact_exists(&self, stage: Stage) -> bool {
        let ws = &self.workspace;
        match stage {
            Stage::None => true,
            Stage::VideosDone => ws.video_map(&self.prefix).exists(),
            Stage::ReplaceDone => ws.modified().exists(),
            Stage::ShrinkDone => ws.slim().exists(),
            Stage::SplitDone | Stage::EmbedDone | Stage::LoggedDone => ws.results().exists(),
        }
    }

    fn run_stage(&self, stage: Stage, source: &Path, results: &dyn Store<Vec<Job>>, report: &mut RunReport) -> Result<()> {
        let ws = &self.workspace;
        let sink = &*self.sink;
        let map_store: JsonFileStore<VideoMap> = JsonFileStore::new(ws.video_map(&self.prefix));

        match stage {
            Stage::None => {}
            Stage::VideosDone => {
                let media_dir = ws.media_dir();
                let harvester = Harvester {
                    store: self.services.store.as_ref(),
                    map_store: &map_store,
                    prefix: &self.prefix,
                    media_dir: &media_dir,
                };
                harvester.run(source, sink)?;
            }
            Stage::ReplaceDone => {
                let map = map_store.load()?;
                let outcome = ppt_pptx::substitute(source, &ws.modified(), &map, sink)?;
                log::info!(
                    "Replaced {} video(s), {} left untouched",
                    outcome.replaced,
                    outcome.unmatched
                );
            }
            Stage::ShrinkDone => {
                let input = require(ws.modified())?;
                let options = ShrinkOptions::from(&self.config);
                let outcome = ppt_pptx::shrink(&input, &ws.slim(), &options, sink)?;
                log::info!(
                    "Recompressed {} image(s), saved {:.1} MB",
                    outcome.recompressed,
                    outcome.bytes_saved as f64 / (1024.0 * 1024.0)
                );
            }
            Stage::SplitDone => {
                let slim = require(ws.slim())?;
                results.save(&report.jobs)?;
                let publisher = Publisher {
                    store: self.services.store.as_ref(),
                    converter: self.services.converter.as_ref(),
                    workspace: ws,
                    prefix: &self.prefix,
                    max_upload_bytes: self.config.max_upload_bytes,
                };
                let outcome = publisher.run(&slim, &mut report.jobs, results, sink)?;
                report.oversized = outcome.oversized;
                results.save(&report.jobs)?;
            }
            Stage::EmbedDone => {
                embed_videos(self.services.editor.as_ref(), &report.jobs, sink)?;
            }
            Stage::LoggedDone => {
                record_ledger(self.services.ledger.as_ref(), &mut report.jobs, &self.config.permitted_admins)?;
                results.save(&report.jobs)?;
            }
        }
        Ok(())
    }
}

fn require(path: std::path::PathBuf) -> Result<std::path::PathBuf> {
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::ArtifactMissing(path.display().to_string()))
    }
}
