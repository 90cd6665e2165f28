use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::FailureKind;

/// Archive metadata for one post. Immutable once produced by the archive client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSummary {
    pub title: String,
    /// Canonical link; unique within one archive snapshot.
    pub link: String,
    pub pub_date: DateTime<Utc>,
    pub description: String,
}

/// One structural unit of cleaned post content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentBlock {
    Heading { level: u8, text: String },
    Paragraph { text: String },
    ListItem { text: String },
    Quote { text: String },
    Preformatted { text: String },
    Image { src: String, alt: String },
    Rule,
}

impl ContentBlock {
    /// Text carried by the block, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            ContentBlock::Heading { text, .. }
            | ContentBlock::Paragraph { text }
            | ContentBlock::ListItem { text }
            | ContentBlock::Quote { text }
            | ContentBlock::Preformatted { text } => Some(text),
            ContentBlock::Image { .. } | ContentBlock::Rule => None,
        }
    }
}

/// Cleaned post body: serialized markup plus the block view derived from it.
///
/// Both views describe the same content; emitters pick whichever suits their
/// target (markup for hypertext and e-book, blocks for paged and plain text).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NormalizedContent {
    pub html: String,
    pub blocks: Vec<ContentBlock>,
}

impl NormalizedContent {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.html.trim().is_empty()
    }

    /// Blocks rendered as plain paragraphs separated by blank lines.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            let line = match block {
                ContentBlock::ListItem { text } => format!("- {text}"),
                ContentBlock::Quote { text } => format!("> {text}"),
                ContentBlock::Rule => "-----".to_string(),
                ContentBlock::Image { .. } => continue,
                other => other.text().unwrap_or_default().to_string(),
            };
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&line);
        }
        out
    }

    pub fn image_sources(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|block| match block {
            ContentBlock::Image { src, .. } => Some(src.as_str()),
            _ => None,
        })
    }
}

/// Sanitizer output: content plus a note when the region selector had to fall back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CleanContent {
    pub content: NormalizedContent,
    pub degradation: Option<String>,
}

/// Terminal result of driving one post through the fetch state machine.
///
/// A post waiting on a retry is only visible as `ItemState::Retrying`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(CleanContent),
    Failed { kind: FailureKind, cause: String },
}

/// Image reference replaced by a local resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub original_url: String,
    pub local_path: PathBuf,
    pub file_name: String,
    pub media_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub cause: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PostStatus {
    Fetched,
    /// Included with best-effort content.
    Degraded { reason: String },
    /// Excluded from compiled output; kept so ordering and counts survive.
    Failed(FailureRecord),
}

/// A summary enriched with cleaned content for one compilation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub summary: PostSummary,
    pub content: NormalizedContent,
    pub media: Vec<MediaRef>,
    pub status: PostStatus,
    /// Image downloads that were dropped while resolving media.
    pub media_failures: Vec<String>,
}

impl Post {
    pub fn from_clean(summary: PostSummary, clean: CleanContent) -> Self {
        let status = match clean.degradation {
            Some(reason) => PostStatus::Degraded { reason },
            None => PostStatus::Fetched,
        };
        Self {
            summary,
            content: clean.content,
            media: Vec::new(),
            status,
            media_failures: Vec::new(),
        }
    }

    /// Placeholder for a post whose fetch failed permanently.
    pub fn failed(summary: PostSummary, record: FailureRecord) -> Self {
        Self {
            summary,
            content: NormalizedContent::default(),
            media: Vec::new(),
            status: PostStatus::Failed(record),
            media_failures: Vec::new(),
        }
    }

    pub fn is_included(&self) -> bool {
        !matches!(self.status, PostStatus::Failed(_))
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        match &self.status {
            PostStatus::Failed(record) => Some(record),
            _ => None,
        }
    }
}
