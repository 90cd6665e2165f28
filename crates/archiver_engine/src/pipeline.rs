use std::path::PathBuf;

use archiver_core::{ArchiverConfig, ConfigError, PostSummary, RunReport};
use archiver_logging::{archiver_info, archiver_warn};
use thiserror::Error;

use crate::archive::{ArchiveClient, ArchiveError};
use crate::compile::{CompileError, CompileOptions, Compiler, OutputFormat};
use crate::fetcher::{ContentFetcher, FetchAllError};
use crate::filename::artifact_stem;
use crate::info::newsletter_info;
use crate::media::MediaResolver;
use crate::persist::{ensure_output_dir, PersistError};
use crate::tracker::EpubTracker;
use crate::{FetchError, HttpSession, Progress, ProgressSink, RunOutcome, RunStatus, Stage};

/// One end-to-end archive run as requested by an outer collaborator.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source_url: String,
    /// Session cookie value; attached to every request when present.
    pub credential: Option<String>,
    pub format: OutputFormat,
    pub limit: Option<usize>,
    /// Append new posts to an existing e-book. Only meaningful for EPUB.
    pub update_existing: bool,
    /// File stem for the artifact; derived from the newsletter title when absent.
    pub output_name: Option<String>,
    pub config: ArchiverConfig,
}

impl RunRequest {
    pub fn new(source_url: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            source_url: source_url.into(),
            credential: None,
            format,
            limit: None,
            update_existing: false,
            output_name: None,
            config: ArchiverConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("could not create http session: {0}")]
    Session(FetchError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    FetchAll(#[from] FetchAllError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("output directory unusable: {0}")]
    Output(PersistError),
    #[error("could not save e-book tracker: {0}")]
    Tracker(PersistError),
}

/// Probe, list, fetch, compile and (for e-books) record what was included.
pub async fn run(request: RunRequest, sink: &dyn ProgressSink) -> Result<RunOutcome, RunError> {
    let config = &request.config;
    config.validate()?;
    let update_mode = request.update_existing && request.format == OutputFormat::Epub;
    if request.update_existing && !update_mode {
        archiver_warn!("Update mode only applies to EPUB output; writing a fresh {}", request.format);
    }

    let session = HttpSession::from_config(config, request.credential.as_deref())
        .map_err(RunError::Session)?;
    let client = ArchiveClient::new(session.clone(), &request.source_url, config)?;

    sink.emit(Progress::Stage(Stage::Probing));
    let info = newsletter_info(&session, client.base_url()).await;
    archiver_info!("Archiving '{}' by {}", info.title, info.author);

    ensure_output_dir(&config.output_dir).map_err(RunError::Output)?;
    let stem = request
        .output_name
        .as_deref()
        .map(artifact_stem)
        .unwrap_or_else(|| artifact_stem(&info.title));
    let destination: PathBuf = config
        .output_dir
        .join(format!("{stem}.{}", request.format.extension()));

    let mut tracker = if request.format == OutputFormat::Epub {
        if update_mode && !EpubTracker::exists(&destination) {
            archiver_warn!("No e-book and tracker to update at {}", destination.display());
            return Ok(finished(RunStatus::MissingEpub, Vec::new()));
        }
        Some(EpubTracker::load(&destination))
    } else {
        None
    };

    let (summaries, warnings) = if update_mode {
        let snapshot = client.fetch_archive(None, sink).await?;
        let fresh = tracker
            .as_ref()
            .map(|tracker| tracker.new_posts(&snapshot.summaries))
            .unwrap_or_default();
        if fresh.is_empty() {
            return Ok(finished(RunStatus::NoNewPosts, snapshot.warnings));
        }
        (keep_most_recent(fresh, request.limit), snapshot.warnings)
    } else {
        let snapshot = client.fetch_archive(request.limit, sink).await?;
        if snapshot.summaries.is_empty() {
            return Ok(finished(RunStatus::NoPosts, snapshot.warnings));
        }
        (snapshot.summaries, snapshot.warnings)
    };

    let fetcher = ContentFetcher::new(session.clone(), config);
    let posts = fetcher.fetch_all(&summaries, config.max_workers, sink).await?;

    sink.emit(Progress::Stage(Stage::Compiling));
    let compiler = Compiler::with_media(MediaResolver::new(session, config));
    let options = CompileOptions {
        title: info.title.clone(),
        author: info.author.clone(),
        source_url: Some(client.source().to_string()),
        update_existing: update_mode,
    };
    let compiled = compiler
        .compile(&posts, request.format, &destination, &options)
        .await?;

    if let Some(tracker) = tracker.as_mut() {
        tracker.set_metadata(&info.title, &info.author, client.source());
        tracker.track(
            posts
                .iter()
                .filter(|post| post.is_included())
                .map(|post| post.summary.link.as_str()),
        );
        tracker.save().map_err(RunError::Tracker)?;
    }

    sink.emit(Progress::Stage(Stage::Done));
    let report = RunReport::from_posts(&posts);
    archiver_info!(
        "Run finished: {} included, {} failed, output {}",
        report.included(),
        report.failed,
        compiled.path.display()
    );
    Ok(RunOutcome {
        status: RunStatus::Completed,
        output_path: Some(compiled.path),
        report,
        warnings,
    })
}

fn finished(status: RunStatus, warnings: Vec<String>) -> RunOutcome {
    RunOutcome {
        status,
        output_path: None,
        report: RunReport::default(),
        warnings,
    }
}

/// Summaries are oldest-first; a limit keeps the newest ones.
fn keep_most_recent(mut summaries: Vec<PostSummary>, limit: Option<usize>) -> Vec<PostSummary> {
    if let Some(limit) = limit {
        let skip = summaries.len().saturating_sub(limit);
        summaries.drain(..skip);
    }
    summaries
}
