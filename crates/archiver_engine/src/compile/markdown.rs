use std::fmt::Write;

use super::{display_date, Document};

pub trait MarkdownConverter: Send + Sync {
    fn to_markdown(&self, html: &str) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Html2MdConverter;

impl MarkdownConverter for Html2MdConverter {
    fn to_markdown(&self, html: &str) -> String {
        html2md::parse_html(html)
    }
}

pub(super) fn render(
    document: &Document<'_>,
    converter: &dyn MarkdownConverter,
) -> Result<Vec<u8>, String> {
    let mut out = String::new();
    render_into(document, converter, &mut out).map_err(|err| err.to_string())?;
    Ok(out.into_bytes())
}

fn render_into(
    document: &Document<'_>,
    converter: &dyn MarkdownConverter,
    out: &mut String,
) -> std::fmt::Result {
    writeln!(out, "# {}", document.title)?;
    if document.has_author() {
        writeln!(out)?;
        writeln!(out, "*By {}*", document.author)?;
    }

    for post in document.posts {
        writeln!(out)?;
        writeln!(out, "---")?;
        writeln!(out)?;
        writeln!(out, "## {}", post.summary.title)?;
        writeln!(out)?;
        writeln!(out, "*{}* | [Original post]({})", display_date(post), post.summary.link)?;
        writeln!(out)?;
        let body = converter.to_markdown(&post.content.html);
        let body = body.trim();
        if !body.is_empty() {
            writeln!(out, "{body}")?;
        }
    }

    if !document.excluded.is_empty() {
        writeln!(out)?;
        writeln!(out, "---")?;
        writeln!(out)?;
        writeln!(out, "## Unavailable posts")?;
        writeln!(out)?;
        for row in document.excluded {
            writeln!(out, "- [{}]({}): {}", row.title, row.link, row.kind)?;
        }
    }
    Ok(())
}
