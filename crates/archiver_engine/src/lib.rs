//! Archiver engine: every IO-bearing stage of the pipeline, from archive
//! listing through content fetch and caching to compiled artifacts.
mod archive;
mod cache;
mod compile;
mod content;
mod decode;
mod engine;
mod fetcher;
mod filename;
mod http;
mod info;
mod media;
mod persist;
mod pipeline;
mod progress;
mod retry;
mod rewrite;
mod sanitize;
mod tracker;
mod types;

pub use archive::{parse_page, ArchiveClient, ArchiveError, ArchivePage, ArchiveSnapshot, PageCursor};
pub use cache::{cache_key, CacheEntry, CacheError, ContentCache, DiskCache, NoCache};
pub use compile::{
    output_path, to_latin1, CompileError, CompileOptions, CompileReport, Compiler,
    Html2MdConverter, MarkdownConverter, OutputFormat, UnknownFormat,
};
pub use content::{build_blocks, normalize_html};
pub use decode::decode_body;
pub use engine::EngineHandle;
pub use fetcher::{ContentFetcher, FetchAllError, ItemReport};
pub use filename::{artifact_stem, sanitize_filename};
pub use http::{FetchMetadata, FetchOutput, Fetcher, HttpSession, HttpSettings};
pub use info::{
    newsletter_info, parse_newsletter_info, verify_session, NewsletterInfo,
    DEFAULT_NEWSLETTER_TITLE, UNKNOWN_AUTHOR,
};
pub use media::{
    image_extension, rewrite_post_videos, rewrite_videos, write_stream, MediaError, MediaResolver,
    IMAGES_DIR,
};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use pipeline::{run, RunError, RunRequest};
pub use progress::{ChannelProgressSink, NoProgress, ProgressSink};
pub use sanitize::{Sanitizer, CONTENT_SELECTORS, DEGRADATION_THRESHOLD, REMOVAL_PATTERNS};
pub use tracker::{EpubTracker, TrackerRecord};
pub use types::{EngineEvent, FetchError, JobId, Progress, RunOutcome, RunStatus, Stage};
