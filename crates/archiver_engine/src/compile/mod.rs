//! Format-agnostic compilation: ordering, exclusion of failed posts, media
//! preparation, and a single dispatch point into the per-format emitters.

mod epub;
mod format;
mod html;
mod json;
mod markdown;
mod pdf;
mod text;

use std::fs;
use std::path::{Path, PathBuf};

use archiver_core::{FailureRow, Post, RunReport};
use archiver_logging::{archiver_info, archiver_warn};
use thiserror::Error;

use crate::info::DEFAULT_NEWSLETTER_TITLE;
use crate::media::{rewrite_post_videos, MediaResolver, IMAGES_DIR};
use crate::persist::{AtomicFileWriter, PersistError};

pub use format::{OutputFormat, UnknownFormat};
pub use markdown::{Html2MdConverter, MarkdownConverter};
pub use pdf::to_latin1;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("no posts to compile")]
    NoPostsToCompile,
    #[error("failed to write {format} output: {message}")]
    FormatWrite {
        format: OutputFormat,
        message: String,
    },
    #[error("failed to persist output: {0}")]
    Persist(#[from] PersistError),
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub title: String,
    pub author: String,
    pub source_url: Option<String>,
    /// Append to an existing e-book at the destination instead of replacing it.
    pub update_existing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileReport {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub included: usize,
    /// Posts left out because their fetch failed.
    pub excluded: Vec<FailureRow>,
    pub media_failures: usize,
}

/// Everything an emitter needs: posts already filtered, ordered and prepared.
pub(crate) struct Document<'a> {
    pub title: &'a str,
    pub author: &'a str,
    pub source_url: Option<&'a str>,
    pub posts: &'a [Post],
    pub excluded: &'a [FailureRow],
}

impl Document<'_> {
    pub fn has_author(&self) -> bool {
        !self.author.trim().is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Compiler {
    media: Option<MediaResolver>,
    writer: AtomicFileWriter,
}

impl Compiler {
    /// Compiler that leaves image references untouched.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiler that downloads images for formats that embed them.
    pub fn with_media(media: MediaResolver) -> Self {
        Self {
            media: Some(media),
            writer: AtomicFileWriter,
        }
    }

    /// Write `posts` as one artifact at `destination` (the format's extension
    /// is appended when missing) and return where it landed.
    pub async fn compile(
        &self,
        posts: &[Post],
        format: OutputFormat,
        destination: &Path,
        options: &CompileOptions,
    ) -> Result<CompileReport, CompileError> {
        let excluded = RunReport::from_posts(posts).failures;
        let mut included: Vec<Post> = posts.iter().filter(|p| p.is_included()).cloned().collect();
        if included.is_empty() {
            return Err(CompileError::NoPostsToCompile);
        }
        included.sort_by_key(|post| post.summary.pub_date);

        let path = output_path(destination, format);
        archiver_info!(
            "Compiling {} posts to {format} at {} ({} excluded)",
            included.len(),
            path.display(),
            excluded.len()
        );

        let prepared = self.prepare(included, format, &path).await;
        let media_failures = prepared.iter().map(|p| p.media_failures.len()).sum();

        let title = if options.title.trim().is_empty() {
            DEFAULT_NEWSLETTER_TITLE
        } else {
            options.title.as_str()
        };
        let document = Document {
            title,
            author: &options.author,
            source_url: options.source_url.as_deref(),
            posts: &prepared,
            excluded: &excluded,
        };

        let previous = if format == OutputFormat::Epub && options.update_existing && path.is_file() {
            Some(fs::read(&path).map_err(|err| CompileError::FormatWrite {
                format,
                message: format!("cannot read existing {}: {err}", path.display()),
            })?)
        } else {
            None
        };

        let bytes = emit(format, &document, previous.as_deref())
            .map_err(|message| CompileError::FormatWrite { format, message })?;
        let written = self.writer.write_bytes(&path, &bytes)?;
        archiver_info!("Wrote {}", written.display());

        Ok(CompileReport {
            path: written,
            format,
            included: prepared.len(),
            excluded,
            media_failures,
        })
    }

    async fn prepare(&self, posts: Vec<Post>, format: OutputFormat, path: &Path) -> Vec<Post> {
        let resolver = match &self.media {
            Some(media) if format.embeds_local_media() => {
                let dir = path.parent().unwrap_or_else(|| Path::new("."));
                Some(media.clone().with_images_dir(dir.join(IMAGES_DIR)))
            }
            _ => None,
        };

        let mut prepared = Vec::with_capacity(posts.len());
        for post in posts {
            let post = match &resolver {
                Some(resolver) => resolver.resolve_media(post).await,
                None => rewrite_post_videos(post),
            };
            if !post.media_failures.is_empty() {
                archiver_warn!(
                    "'{}': {} images dropped",
                    post.summary.title,
                    post.media_failures.len()
                );
            }
            prepared.push(post);
        }
        prepared
    }
}

/// The single dispatch point from format variant to emitter.
fn emit(
    format: OutputFormat,
    document: &Document<'_>,
    previous: Option<&[u8]>,
) -> Result<Vec<u8>, String> {
    match format {
        OutputFormat::Pdf => pdf::render(document),
        OutputFormat::Epub => epub::render(document, previous),
        OutputFormat::Json => json::render(document),
        OutputFormat::Html => html::render(document),
        OutputFormat::Text => text::render(document),
        OutputFormat::Markdown => markdown::render(document, &Html2MdConverter),
    }
}

/// `destination` with the format's extension appended unless it already has it.
pub fn output_path(destination: &Path, format: OutputFormat) -> PathBuf {
    let matches = destination
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(format.extension()));
    if matches {
        destination.to_path_buf()
    } else {
        let mut name = destination.as_os_str().to_os_string();
        name.push(".");
        name.push(format.extension());
        PathBuf::from(name)
    }
}

pub(crate) fn display_date(post: &Post) -> String {
    post.summary.pub_date.format("%Y-%m-%d").to_string()
}
