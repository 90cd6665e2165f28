use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use archiver_core::{ArchiverConfig, MediaRef, Post, RetryPolicy};
use archiver_logging::{archiver_debug, archiver_info, archiver_warn};
use futures_util::{Stream, StreamExt};
use scraper::{ElementRef, Html, Selector};
use tempfile::NamedTempFile;
use thiserror::Error;
use url::Url;

use crate::content::normalize_html;
use crate::filename::short_hash;
use crate::http::content_type_of;
use crate::retry::{with_retry, IsRetryable};
use crate::rewrite::{escaped, escaped_attr, open_tag, serialize_children, Rewrite};
use crate::{FetchError, HttpSession};

pub const IMAGES_DIR: &str = "images";
const VIDEO_PLATFORMS: &[&str] = &[
    "youtube.com",
    "youtube-nocookie.com",
    "youtu.be",
    "vimeo.com",
    "wistia.com",
    "loom.com",
    "substack.com/embed",
];

#[derive(Debug, Error)]
pub enum MediaError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("image exceeds {max_bytes} bytes")]
    TooLarge { max_bytes: u64, actual: Option<u64> },
    #[error("transfer interrupted: {0}")]
    Stream(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported image reference: {0}")]
    Unsupported(String),
}

impl IsRetryable for MediaError {
    fn is_retryable(&self) -> bool {
        match self {
            MediaError::Fetch(err) => err.kind.is_retryable(),
            MediaError::Stream(_) => true,
            _ => false,
        }
    }
}

/// Downloads embedded images into `{output_dir}/images` and rewrites video embeds.
#[derive(Debug, Clone)]
pub struct MediaResolver {
    session: HttpSession,
    images_dir: PathBuf,
    max_image_bytes: u64,
    policy: RetryPolicy,
}

impl MediaResolver {
    pub fn new(session: HttpSession, config: &ArchiverConfig) -> Self {
        Self {
            session,
            images_dir: config.output_dir.join(IMAGES_DIR),
            max_image_bytes: config.max_image_bytes,
            policy: config.retry_policy(),
        }
    }

    pub fn with_images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.images_dir = dir.into();
        self
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Replace image references with local files and video embeds with links.
    ///
    /// A failed image is dropped from the post and recorded in
    /// `media_failures`; it never aborts the post.
    pub async fn resolve_media(&self, post: Post) -> Post {
        let mut post = rewrite_post_videos(post);
        let base = Url::parse(&post.summary.link).ok();

        let sources = image_sources(&post.content.html);
        let mut resolved: HashMap<String, MediaRef> = HashMap::new();
        let mut dropped: Vec<String> = Vec::new();

        for src in sources {
            if src.starts_with("data:") {
                continue;
            }
            let Some(url) = resolve_reference(&src, base.as_ref()) else {
                archiver_warn!("Dropping unresolvable image reference {src}");
                post.media_failures.push(format!("{src}: unresolvable reference"));
                dropped.push(src);
                continue;
            };
            match self.download_image(url.as_str()).await {
                Ok(media) => {
                    resolved.insert(src, media);
                }
                Err(err) => {
                    archiver_warn!(
                        "Dropping image {url} from '{}': {err}",
                        post.summary.title
                    );
                    post.media_failures.push(format!("{url}: {err}"));
                    dropped.push(src);
                }
            }
        }

        if resolved.is_empty() && dropped.is_empty() {
            return post;
        }

        let html = rewrite_images(&post.content.html, &resolved, &dropped);
        post.content = normalize_html(&html);
        let mut media: Vec<MediaRef> = resolved.into_values().collect();
        media.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        media.dedup_by(|a, b| a.file_name == b.file_name);
        post.media = media;
        post
    }

    /// Download one image with retries. A failed attempt never leaves a file behind.
    pub async fn download_image(&self, url: &str) -> Result<MediaRef, MediaError> {
        if url.starts_with("data:") {
            return Err(MediaError::Unsupported("data URI".to_string()));
        }
        let label = format!("image {url}");
        with_retry(&self.policy, &label, || self.download_once(url))
            .await
            .map_err(|(err, _)| err)
    }

    async fn download_once(&self, url: &str) -> Result<MediaRef, MediaError> {
        let response = self.session.open(url).await?;
        if let Some(len) = response.content_length() {
            if len > self.max_image_bytes {
                return Err(MediaError::TooLarge {
                    max_bytes: self.max_image_bytes,
                    actual: Some(len),
                });
            }
        }

        let extension = image_extension(content_type_of(&response).as_deref(), url);
        let file_name = format!("{}.{extension}", short_hash(url, 8));
        let target = self.images_dir.join(&file_name);
        let media = MediaRef {
            original_url: url.to_string(),
            local_path: target.clone(),
            file_name,
            media_type: media_type_for(extension).to_string(),
        };

        if target.is_file() {
            archiver_debug!("Image {url} already stored at {}", target.display());
            return Ok(media);
        }
        let written = write_stream(response.bytes_stream(), &target, self.max_image_bytes).await?;
        archiver_debug!("Stored image {url} ({written} bytes) at {}", target.display());
        Ok(media)
    }
}

/// Stream a body into `target` through a temp file in the same directory.
///
/// The file only appears at `target` after the whole stream was written; on
/// a stream error or when `max_bytes` is exceeded the temp file is removed.
pub async fn write_stream<S, B, E>(stream: S, target: &Path, max_bytes: u64) -> Result<u64, MediaError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    let mut stream = std::pin::pin!(stream);
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| MediaError::Stream(err.to_string()))?;
        let bytes = chunk.as_ref();
        written += bytes.len() as u64;
        if written > max_bytes {
            return Err(MediaError::TooLarge {
                max_bytes,
                actual: None,
            });
        }
        tmp.write_all(bytes)?;
    }

    tmp.flush()?;
    tmp.persist(target).map_err(|err| MediaError::Io(err.error))?;
    Ok(written)
}

/// Apply [`rewrite_videos`] to a post, resolving root-relative URLs against its link.
pub fn rewrite_post_videos(mut post: Post) -> Post {
    let base = Url::parse(&post.summary.link).ok();
    if !post.content.html.contains("<video") && !post.content.html.contains("<iframe") {
        return post;
    }
    let html = rewrite_videos(&post.content.html, base.as_ref());
    post.content = normalize_html(&html);
    post
}

/// Replace `<video>` elements and video-platform `<iframe>` embeds with links.
pub fn rewrite_videos(html: &str, base: Option<&Url>) -> String {
    let fragment = Html::parse_fragment(html);
    let source_sel = Selector::parse("source").ok();
    let mut converted = 0usize;

    let out = serialize_children(*fragment.root_element(), &mut |element| {
        match element.value().name() {
            "video" => {
                converted += 1;
                Rewrite::Replace(video_link(element, source_sel.as_ref(), base))
            }
            "iframe" => match element.value().attr("src").and_then(iframe_link) {
                Some(markup) => {
                    converted += 1;
                    Rewrite::Replace(markup)
                }
                None => Rewrite::Keep,
            },
            _ => Rewrite::Keep,
        }
    });

    if converted > 0 {
        archiver_info!("Converted {converted} video embeds to links");
    }
    out
}

fn video_link(video: ElementRef<'_>, source_sel: Option<&Selector>, base: Option<&Url>) -> String {
    let sources: Vec<(String, String)> = source_sel
        .map(|sel| {
            video
                .select(sel)
                .filter_map(|source| {
                    let src = source.value().attr("src")?.trim();
                    let kind = source.value().attr("type").unwrap_or_default();
                    (!src.is_empty()).then(|| (src.to_string(), kind.to_ascii_lowercase()))
                })
                .collect()
        })
        .unwrap_or_default();

    let chosen = sources
        .iter()
        .find(|(src, kind)| kind.contains("mp4") || src.to_ascii_lowercase().contains(".mp4"))
        .or_else(|| sources.first())
        .map(|(src, _)| src.clone())
        .or_else(|| {
            video
                .value()
                .attr("src")
                .map(str::trim)
                .filter(|src| !src.is_empty())
                .map(str::to_string)
        });

    let Some(raw) = chosen else {
        return "<p><em>Video content (URL not available)</em></p>".to_string();
    };
    let url = match (raw.starts_with('/'), base) {
        (true, Some(base)) => base.join(&raw).map(String::from).unwrap_or(raw),
        _ => raw,
    };

    if url.contains("/api/v1/video/") {
        format!(
            "<p><a href=\"{}\">Click to watch Substack video</a> <em>(May require login to view)</em></p>",
            escaped_attr(&url)
        )
    } else {
        format!(
            "<p><a href=\"{}\">Click to watch video</a></p>",
            escaped_attr(&url)
        )
    }
}

fn iframe_link(src: &str) -> Option<String> {
    if !VIDEO_PLATFORMS.iter().any(|platform| src.contains(platform)) {
        return None;
    }
    let url = watch_url(src);
    let platform = if src.contains("youtube") || src.contains("youtu.be") {
        "YouTube"
    } else if src.contains("vimeo") {
        "Vimeo"
    } else if src.contains("loom") {
        "Loom"
    } else if src.contains("wistia") {
        "Wistia"
    } else {
        "Video"
    };
    Some(format!(
        "<p><a href=\"{href}\">Watch on {platform}</a><br/><small>Link: {text}</small></p>",
        href = escaped_attr(&url),
        text = escaped(&url),
    ))
}

/// Embed URLs for YouTube become regular watch links.
fn watch_url(src: &str) -> String {
    for marker in ["youtube-nocookie.com/embed/", "youtube.com/embed/"] {
        if let Some((_, rest)) = src.split_once(marker) {
            let id = rest.split(['?', '&', '/']).next().unwrap_or_default();
            return format!("https://www.youtube.com/watch?v={id}");
        }
    }
    if src.contains("youtu.be/") {
        return src.replacen("youtu.be/", "youtube.com/watch?v=", 1);
    }
    src.to_string()
}

fn image_sources(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    let Ok(selector) = Selector::parse("img[src]") else {
        return Vec::new();
    };
    let mut sources: Vec<String> = Vec::new();
    for img in fragment.select(&selector) {
        let src = img.value().attr("src").unwrap_or_default().trim();
        if !src.is_empty() && !sources.iter().any(|seen| seen == src) {
            sources.push(src.to_string());
        }
    }
    sources
}

fn rewrite_images(html: &str, resolved: &HashMap<String, MediaRef>, dropped: &[String]) -> String {
    let fragment = Html::parse_fragment(html);
    serialize_children(*fragment.root_element(), &mut |element| {
        if element.value().name() != "img" {
            return Rewrite::Keep;
        }
        let src = element.value().attr("src").unwrap_or_default().trim();
        if dropped.iter().any(|d| d == src) {
            return Rewrite::Drop;
        }
        match resolved.get(src) {
            Some(media) => {
                let local = format!("{IMAGES_DIR}/{}", media.file_name);
                let alt = element.value().attr("alt").unwrap_or_default();
                Rewrite::Replace(open_tag("img", &[("src", local.as_str()), ("alt", alt)], true))
            }
            None => Rewrite::Keep,
        }
    })
}

fn resolve_reference(src: &str, base: Option<&Url>) -> Option<Url> {
    if let Ok(url) = Url::parse(src) {
        return matches!(url.scheme(), "http" | "https").then_some(url);
    }
    base.and_then(|base| base.join(src).ok())
}

/// Extension from the Content-Type, then the URL path; `jpg` otherwise.
pub fn image_extension(content_type: Option<&str>, url: &str) -> &'static str {
    if let Some(ct) = content_type.map(str::to_ascii_lowercase) {
        if ct.contains("png") {
            return "png";
        }
        if ct.contains("gif") {
            return "gif";
        }
        if ct.contains("svg") {
            return "svg";
        }
        if ct.contains("webp") {
            return "webp";
        }
        if ct.contains("jpeg") || ct.contains("jpg") {
            return "jpg";
        }
    }
    let path = Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| url.to_ascii_lowercase());
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("png") => "png",
        Some("gif") => "gif",
        Some("svg") => "svg",
        Some("webp") => "webp",
        _ => "jpg",
    }
}

pub fn media_type_for(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}
