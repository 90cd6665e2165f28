//! Archiver core: data model, configuration and the pure per-post fetch state machine.
mod config;
mod directive;
mod event;
mod failure;
mod link;
mod model;
mod report;
mod state;
mod update;

pub use config::{ArchiverConfig, ConfigError, RetryPolicy};
pub use directive::ItemDirective;
pub use event::ItemEvent;
pub use failure::FailureKind;
pub use link::normalize_link;
pub use model::{
    CleanContent, ContentBlock, FailureRecord, FetchOutcome, MediaRef, NormalizedContent, Post,
    PostStatus, PostSummary,
};
pub use report::{FailureRow, RunReport};
pub use state::ItemState;
pub use update::advance;
