//! CLI tool for splitting slide decks into per-job presentations and
//! publishing them together with their embedded videos.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ppt_core::store::{load_history, save_history};
use ppt_core::{validate_jobs, Job, JobHistory, JobResult, JsonFileStore, PipelineConfig};
use ppt_pipeline::{Orchestrator, RunReport, Workspace};
use ppt_remote::{fetch_source, is_url, GoogleClient, GoogleConfig, MemoryBackend, RemoteServices};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Split a deck into slide ranges and publish each one, videos included.
#[derive(Parser, Debug)]
#[command(name = "ppt-publish")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Pipeline settings (JSON); defaults apply when absent
    #[arg(short, long, global = true, default_value = "ppt-publish.json")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the slides of a deck
    Inspect {
        /// Input PowerPoint file (.pptx)
        input: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a job list against a deck without running anything
    Validate {
        /// Input PowerPoint file (.pptx)
        input: PathBuf,

        /// Jobs file (JSON array)
        #[arg(short, long)]
        jobs: PathBuf,
    },

    /// Run (or resume) the publishing pipeline
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Input PowerPoint file (.pptx) or http(s) URL
    source: String,

    /// Jobs file (JSON array); the saved list for this deck is used when omitted
    #[arg(short, long)]
    jobs: Option<PathBuf>,

    /// Saved job lists, keyed by deck file name
    #[arg(long, default_value = "job_history.json")]
    history: PathBuf,

    /// Working directory for intermediate files and checkpoints
    #[arg(short, long, default_value = "ppt-work")]
    workspace: PathBuf,

    /// Prefix for every uploaded file name
    #[arg(short, long, default_value = "")]
    prefix: String,

    /// OAuth access token for Google Drive, Slides and Sheets
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Use an in-memory stand-in for every remote service
    #[arg(long)]
    dry_run: bool,

    /// Delete the working directory after a completed run
    #[arg(long)]
    clean: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let config = PipelineConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    match args.command {
        Command::Inspect { input, json } => inspect(&input, json),
        Command::Validate { input, jobs } => validate(&input, &jobs),
        Command::Run(run_args) => run(run_args, config),
    }
}

fn inspect(input: &Path, json: bool) -> Result<()> {
    let deck = ppt_pptx::inspect(input).with_context(|| format!("Failed to read {}", input.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&deck)?);
        return Ok(());
    }

    println!("{}: {} slides", input.display(), deck.slide_count());
    for slide in &deck.slides {
        let videos = match slide.videos {
            0 => String::new(),
            1 => "  [1 video]".to_string(),
            n => format!("  [{} videos]", n),
        };
        println!("{:>4}. {}{}", slide.number, slide.summary, videos);
    }
    Ok(())
}

fn validate(input: &Path, jobs_path: &Path) -> Result<()> {
    let jobs = read_jobs(jobs_path)?;
    check_jobs(input, &jobs)?;
    println!("{} job(s) OK", jobs.len());
    Ok(())
}

fn run(args: RunArgs, config: PipelineConfig) -> Result<()> {
    let workspace = Workspace::new(&args.workspace);
    workspace
        .ensure()
        .with_context(|| format!("Failed to create {}", args.workspace.display()))?;

    let source = resolve_source(&args.source, &workspace)?;
    let deck_name = source_name(&args.source);

    let history: JsonFileStore<JobHistory> = JsonFileStore::new(&args.history);
    let jobs = match &args.jobs {
        Some(path) => read_jobs(path)?,
        None => {
            let saved = load_history(&history, &deck_name)?;
            log::info!("Using {} saved job(s) for {}", saved.len(), deck_name);
            saved
        }
    };
    if jobs.is_empty() {
        bail!("No jobs given for {} (use --jobs)", deck_name);
    }
    check_jobs(&source, &jobs)?;

    let definitions: Vec<Job> = jobs
        .iter()
        .cloned()
        .map(|mut job| {
            job.result = JobResult::default();
            job
        })
        .collect();
    save_history(&history, &deck_name, &definitions)
        .with_context(|| format!("Failed to save {}", args.history.display()))?;

    let services = if args.dry_run {
        log::warn!("Dry run: nothing leaves this machine");
        RemoteServices::from_backend(Arc::new(MemoryBackend::new()))
    } else {
        let token = args
            .access_token
            .clone()
            .context("An access token is required (--access-token or GOOGLE_ACCESS_TOKEN), or use --dry-run")?;
        let client = GoogleClient::new(GoogleConfig::new(token, &config))?;
        RemoteServices::from_backend(Arc::new(client))
    };

    let orchestrator = Orchestrator::new(workspace, services, config).with_prefix(args.prefix.clone());
    let report = orchestrator.run(&source, jobs)?;
    print_report(&report, &args.prefix);

    if report.halted_oversized() {
        bail!("{} job(s) are too large to upload", report.oversized.len());
    }
    if args.clean && report.is_finished() {
        orchestrator.workspace().clean()?;
    }
    Ok(())
}

/// Local path of the deck, downloading it first when given a URL.
fn resolve_source(source: &str, workspace: &Workspace) -> Result<PathBuf> {
    if !is_url(source) {
        return Ok(PathBuf::from(source));
    }
    let local = workspace.source();
    if local.exists() {
        log::info!("Using previously downloaded {}", local.display());
    } else {
        fetch_source(source, &local).with_context(|| format!("Failed to download {}", source))?;
    }
    Ok(local)
}

/// Key for the job history: the deck's file name.
fn source_name(source: &str) -> String {
    let path = source.split(['?', '#']).next().unwrap_or(source);
    let name = path.trim_end_matches('/').rsplit(['/', '\\']).next().unwrap_or(path);
    if name.is_empty() {
        source.to_string()
    } else {
        name.to_string()
    }
}

fn read_jobs(path: &Path) -> Result<Vec<Job>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid jobs file {}", path.display()))
}

fn check_jobs(deck: &Path, jobs: &[Job]) -> Result<()> {
    let total = ppt_pptx::inspect(deck)
        .with_context(|| format!("Failed to read {}", deck.display()))?
        .slide_count();
    let errors = validate_jobs(jobs, total);
    if errors.is_empty() {
        return Ok(());
    }
    for error in &errors {
        eprintln!("  {}", error);
    }
    bail!("{} problem(s) in the job list", errors.len())
}

fn print_report(report: &RunReport, prefix: &str) {
    println!();
    for job in &report.jobs {
        let name = job.display_name(prefix);
        match (&job.result.final_link, job.result.size_mb) {
            (Some(link), _) => println!("{}: {}", name, link),
            (None, Some(mb)) if job.result.error_too_large => println!("{}: too large ({:.1} MB)", name, mb),
            _ => println!("{}: not published", name),
        }
    }
    println!("Completed through: {}", report.completed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_name() {
        assert_eq!(source_name("/decks/Easter.pptx"), "Easter.pptx");
        assert_eq!(source_name("https://host/files/Easter.pptx?dl=1"), "Easter.pptx");
        assert_eq!(source_name("Easter.pptx"), "Easter.pptx");
    }

    #[test]
    fn test_read_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(
            &path,
            r#"[{"id": "a", "filename": "Intro", "start": 1, "end": 3, "category": "Teaching"}]"#,
        )
        .unwrap();
        let jobs = read_jobs(&path).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].category, "Teaching");
        assert!(!jobs[0].is_published());
    }

    #[test]
    fn test_local_source_is_used_as_is() {
        let ws = Workspace::new("/unused");
        assert_eq!(resolve_source("deck.pptx", &ws).unwrap(), PathBuf::from("deck.pptx"));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["ppt-publish", "run", "deck.pptx", "--dry-run", "--prefix", "Easter"]);
        match args.command {
            Command::Run(run) => {
                assert!(run.dry_run);
                assert_eq!(run.prefix, "Easter");
                assert_eq!(run.history, PathBuf::from("job_history.json"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
