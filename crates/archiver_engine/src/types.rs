use std::fmt;
use std::path::PathBuf;

use archiver_core::{FailureKind, ItemState, RunReport};

pub type JobId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Probing,
    ListingArchive,
    FetchingContent,
    Compiling,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Stage(Stage),
    ArchiveCollected {
        collected: usize,
        limit: Option<usize>,
    },
    Post {
        index: usize,
        total: usize,
        title: String,
        state: ItemState,
    },
}

/// Notifications delivered to an outer collaborator through `EngineHandle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Progress { job_id: JobId, progress: Progress },
    JobCompleted {
        job_id: JobId,
        result: Result<RunOutcome, String>,
    },
}

/// How a pipeline run ended when it did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Written artifact; `None` unless the run completed.
    pub output_path: Option<PathBuf>,
    pub report: RunReport,
    /// Non-fatal archive warnings (skipped items, date fallbacks).
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// The archive listing was empty.
    NoPosts,
    /// Update mode found nothing the e-book does not already contain.
    NoNewPosts,
    /// Update mode was requested but there is no e-book plus tracker to update.
    MissingEpub,
}
