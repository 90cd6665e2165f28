use std::fmt::Write;

use super::{display_date, Document};

const POST_SEPARATOR: &str = "----------------------------------------";

pub(super) fn render(document: &Document<'_>) -> Result<Vec<u8>, String> {
    let mut out = String::new();
    render_into(document, &mut out).map_err(|err| err.to_string())?;
    Ok(out.into_bytes())
}

fn render_into(document: &Document<'_>, out: &mut String) -> std::fmt::Result {
    writeln!(out, "{}", document.title)?;
    writeln!(out, "{}", "=".repeat(document.title.chars().count().max(1)))?;
    if document.has_author() {
        writeln!(out, "By {}", document.author)?;
    }
    if let Some(source) = document.source_url {
        writeln!(out, "{source}")?;
    }

    for post in document.posts {
        writeln!(out)?;
        writeln!(out, "{POST_SEPARATOR}")?;
        writeln!(out)?;
        writeln!(out, "{}", post.summary.title)?;
        writeln!(out, "{}", display_date(post))?;
        writeln!(out, "{}", post.summary.link)?;
        writeln!(out)?;
        let body = post.content.plain_text();
        if !body.is_empty() {
            writeln!(out, "{body}")?;
        }
    }

    if !document.excluded.is_empty() {
        writeln!(out)?;
        writeln!(out, "{POST_SEPARATOR}")?;
        writeln!(out)?;
        writeln!(out, "Unavailable posts")?;
        writeln!(out)?;
        for row in document.excluded {
            writeln!(out, "- {} ({}): {}", row.title, row.link, row.kind)?;
        }
    }
    Ok(())
}
