use std::fmt::Write;

use super::{display_date, Document};
use crate::rewrite::{escaped, escaped_attr};

const STYLE: &str = "body{font-family:Georgia,serif;max-width:46em;margin:2em auto;padding:0 1em;line-height:1.6;color:#222}\
h1,h2,h3{font-family:Helvetica,Arial,sans-serif;line-height:1.25}\
.meta{color:#666;font-size:.9em}\
article{border-top:1px solid #ddd;margin-top:3em;padding-top:1em}\
img{max-width:100%;height:auto}\
blockquote{border-left:3px solid #ccc;margin-left:0;padding-left:1em;color:#555}\
pre{overflow-x:auto;background:#f6f6f6;padding:.75em}\
.unavailable{border-top:1px solid #ddd;margin-top:3em;color:#8a1f11}";

/// Standalone page with a table of contents; images point at the sibling `images/` directory.
pub(super) fn render(document: &Document<'_>) -> Result<Vec<u8>, String> {
    let mut out = String::new();
    render_into(document, &mut out).map_err(|err| err.to_string())?;
    Ok(out.into_bytes())
}

fn render_into(document: &Document<'_>, out: &mut String) -> std::fmt::Result {
    let title = escaped(document.title);
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html lang=\"en\">")?;
    writeln!(out, "<head>")?;
    writeln!(out, "<meta charset=\"utf-8\"/>")?;
    writeln!(out, "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"/>")?;
    if document.has_author() {
        writeln!(out, "<meta name=\"author\" content=\"{}\"/>", escaped_attr(document.author))?;
    }
    writeln!(out, "<title>{title}</title>")?;
    writeln!(out, "<style>{STYLE}</style>")?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body>")?;
    writeln!(out, "<header>")?;
    writeln!(out, "<h1>{title}</h1>")?;
    if document.has_author() {
        writeln!(out, "<p class=\"meta\">By {}</p>", escaped(document.author))?;
    }
    if let Some(source) = document.source_url {
        writeln!(
            out,
            "<p class=\"meta\"><a href=\"{}\">{}</a></p>",
            escaped_attr(source),
            escaped(source)
        )?;
    }
    writeln!(out, "</header>")?;

    writeln!(out, "<nav>")?;
    writeln!(out, "<h2>Contents</h2>")?;
    writeln!(out, "<ol>")?;
    for (index, post) in document.posts.iter().enumerate() {
        writeln!(
            out,
            "<li><a href=\"#post-{}\">{}</a> <span class=\"meta\">{}</span></li>",
            index + 1,
            escaped(&post.summary.title),
            display_date(post)
        )?;
    }
    writeln!(out, "</ol>")?;
    writeln!(out, "</nav>")?;

    for (index, post) in document.posts.iter().enumerate() {
        writeln!(out, "<article id=\"post-{}\">", index + 1)?;
        writeln!(out, "<h2>{}</h2>", escaped(&post.summary.title))?;
        writeln!(
            out,
            "<p class=\"meta\">{} | <a href=\"{}\">Original post</a></p>",
            display_date(post),
            escaped_attr(&post.summary.link)
        )?;
        writeln!(out, "{}", post.content.html)?;
        writeln!(out, "</article>")?;
    }

    if !document.excluded.is_empty() {
        writeln!(out, "<section class=\"unavailable\">")?;
        writeln!(out, "<h2>Unavailable posts</h2>")?;
        writeln!(out, "<ul>")?;
        for row in document.excluded {
            writeln!(
                out,
                "<li><a href=\"{}\">{}</a>: {}</li>",
                escaped_attr(&row.link),
                escaped(&row.title),
                escaped(&row.kind.to_string())
            )?;
        }
        writeln!(out, "</ul>")?;
        writeln!(out, "</section>")?;
    }

    writeln!(out, "</body>")?;
    writeln!(out, "</html>")?;
    Ok(())
}
