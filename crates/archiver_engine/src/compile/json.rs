use archiver_core::{ContentBlock, FailureKind, Post, PostStatus};
use serde::Serialize;

use super::Document;

#[derive(Serialize)]
struct JsonArchive<'a> {
    title: &'a str,
    posts: Vec<JsonPost<'a>>,
    failures: Vec<JsonFailure<'a>>,
}

#[derive(Serialize)]
struct JsonPost<'a> {
    title: &'a str,
    link: &'a str,
    pub_date: String,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    degraded: Option<&'a str>,
    content_html: &'a str,
    content_text: String,
    blocks: &'a [ContentBlock],
}

#[derive(Serialize)]
struct JsonFailure<'a> {
    title: &'a str,
    link: &'a str,
    error: &'a FailureKind,
    cause: &'a str,
}

/// Stable, timestamp-free JSON: the same posts always produce the same bytes.
pub(super) fn render(document: &Document<'_>) -> Result<Vec<u8>, String> {
    let archive = JsonArchive {
        title: document.title,
        posts: document.posts.iter().map(json_post).collect(),
        failures: document
            .excluded
            .iter()
            .map(|row| JsonFailure {
                title: &row.title,
                link: &row.link,
                error: &row.kind,
                cause: &row.cause,
            })
            .collect(),
    };
    let mut bytes = serde_json::to_vec_pretty(&archive).map_err(|err| err.to_string())?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn json_post(post: &Post) -> JsonPost<'_> {
    JsonPost {
        title: &post.summary.title,
        link: &post.summary.link,
        pub_date: post.summary.pub_date.to_rfc3339(),
        description: &post.summary.description,
        degraded: match &post.status {
            PostStatus::Degraded { reason } => Some(reason.as_str()),
            _ => None,
        },
        content_html: &post.content.html,
        content_text: post.content.plain_text(),
        blocks: &post.content.blocks,
    }
}
