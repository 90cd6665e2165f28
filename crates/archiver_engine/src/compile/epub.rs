use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io::{Cursor, Read, Write};

use archiver_logging::{archiver_info, archiver_warn};
use chrono::{SecondsFormat, Utc};
use scraper::{Html, Selector};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{display_date, Document};
use crate::filename::short_hash;
use crate::media::{media_type_for, IMAGES_DIR};
use crate::rewrite::{escaped, escaped_attr};

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

const STYLE_CSS: &str = "body{font-family:serif;line-height:1.5}\n\
h1{font-size:1.4em}\n\
.meta{color:#666;font-size:.85em}\n\
img{max-width:100%}\n\
blockquote{margin-left:1em;padding-left:.75em;border-left:2px solid #999}\n";

struct Chapter {
    file_name: String,
    title: String,
    body: Vec<u8>,
}

struct Image {
    media_type: String,
    bytes: Vec<u8>,
}

/// EPUB 3 package. With `previous`, chapters and images of the existing book
/// are carried over and the new posts are appended after them.
pub(super) fn render(document: &Document<'_>, previous: Option<&[u8]>) -> Result<Vec<u8>, String> {
    let (mut chapters, mut images) = match previous {
        Some(bytes) => read_existing(bytes)?,
        None => (Vec::new(), BTreeMap::new()),
    };
    let carried = chapters.len();

    for post in document.posts {
        let number = chapters.len() + 1;
        chapters.push(Chapter {
            file_name: format!("chapter_{number:04}.xhtml"),
            title: post.summary.title.clone(),
            body: chapter_xhtml(
                &post.summary.title,
                &format!(
                    "<p class=\"meta\">{} | <a href=\"{}\">Original post</a></p>\n{}",
                    display_date(post),
                    escaped_attr(&post.summary.link),
                    post.content.html
                ),
            )
            .into_bytes(),
        });
        for media in &post.media {
            if images.contains_key(&media.file_name) {
                continue;
            }
            match fs::read(&media.local_path) {
                Ok(bytes) => {
                    images.insert(
                        media.file_name.clone(),
                        Image {
                            media_type: media.media_type.clone(),
                            bytes,
                        },
                    );
                }
                Err(err) => archiver_warn!(
                    "Image {} missing from e-book: {err}",
                    media.local_path.display()
                ),
            }
        }
    }

    if carried > 0 {
        archiver_info!(
            "Appending {} chapters to {carried} existing chapters",
            chapters.len() - carried
        );
    }
    write_package(document, &chapters, &images).map_err(|err| err.to_string())
}

fn write_package(
    document: &Document<'_>,
    chapters: &[Chapter],
    images: &BTreeMap<String, Image>,
) -> zip::result::ZipResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;
    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;
    zip.start_file("OEBPS/style.css", deflated)?;
    zip.write_all(STYLE_CSS.as_bytes())?;
    zip.start_file("OEBPS/content.opf", deflated)?;
    zip.write_all(package_opf(document, chapters, images).as_bytes())?;
    zip.start_file("OEBPS/nav.xhtml", deflated)?;
    zip.write_all(nav_xhtml(chapters).as_bytes())?;
    zip.start_file("OEBPS/toc.ncx", deflated)?;
    zip.write_all(toc_ncx(document, chapters).as_bytes())?;
    zip.start_file("OEBPS/title.xhtml", deflated)?;
    zip.write_all(title_page(document).as_bytes())?;

    for chapter in chapters {
        zip.start_file(format!("OEBPS/{}", chapter.file_name), deflated)?;
        zip.write_all(&chapter.body)?;
    }
    for (file_name, image) in images {
        zip.start_file(format!("OEBPS/{IMAGES_DIR}/{file_name}"), stored)?;
        zip.write_all(&image.bytes)?;
    }

    Ok(zip.finish()?.into_inner())
}

fn read_existing(bytes: &[u8]) -> Result<(Vec<Chapter>, BTreeMap<String, Image>), String> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|err| format!("existing e-book unreadable: {err}"))?;
    let title_sel = Selector::parse("title").map_err(|err| err.to_string())?;
    let image_prefix = format!("OEBPS/{IMAGES_DIR}/");

    let mut chapters = Vec::new();
    let mut images = BTreeMap::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|err| err.to_string())?;
        let name = entry.name().to_string();
        let mut body = Vec::new();

        if let Some(file_name) = name.strip_prefix("OEBPS/") {
            if file_name.starts_with("chapter_") && file_name.ends_with(".xhtml") {
                entry.read_to_end(&mut body).map_err(|err| err.to_string())?;
                let text = String::from_utf8_lossy(&body);
                let title = Html::parse_document(&text)
                    .select(&title_sel)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string())
                    .unwrap_or_else(|| file_name.to_string());
                chapters.push(Chapter {
                    file_name: file_name.to_string(),
                    title,
                    body,
                });
                continue;
            }
        }
        if let Some(file_name) = name.strip_prefix(&image_prefix) {
            entry.read_to_end(&mut body).map_err(|err| err.to_string())?;
            let extension = file_name.rsplit_once('.').map_or("jpg", |(_, ext)| ext);
            images.insert(
                file_name.to_string(),
                Image {
                    media_type: media_type_for(extension).to_string(),
                    bytes: body,
                },
            );
        }
    }
    chapters.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok((chapters, images))
}

fn book_id(document: &Document<'_>) -> String {
    let seed = format!("{}|{}", document.title, document.source_url.unwrap_or_default());
    format!("urn:archiver:{}", short_hash(&seed, 16))
}

fn chapter_id(file_name: &str) -> &str {
    file_name.trim_end_matches(".xhtml")
}

fn chapter_xhtml(title: &str, body: &str) -> String {
    let title = escaped(title);
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<!DOCTYPE html>\n\
<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"en\">\n\
<head>\n<title>{title}</title>\n<link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\"/>\n</head>\n\
<body>\n<h1>{title}</h1>\n{body}\n</body>\n</html>\n"
    )
}

fn title_page(document: &Document<'_>) -> String {
    let mut body = String::new();
    if document.has_author() {
        let _ = writeln!(body, "<p class=\"meta\">By {}</p>", escaped(document.author));
    }
    if let Some(source) = document.source_url {
        let _ = writeln!(body, "<p class=\"meta\">{}</p>", escaped(source));
    }
    chapter_xhtml(document.title, &body)
}

fn package_opf(
    document: &Document<'_>,
    chapters: &[Chapter],
    images: &BTreeMap<String, Image>,
) -> String {
    let modified = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut manifest = String::new();
    let mut spine = String::new();
    let _ = writeln!(manifest, "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>");
    let _ = writeln!(manifest, "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>");
    let _ = writeln!(manifest, "    <item id=\"css\" href=\"style.css\" media-type=\"text/css\"/>");
    let _ = writeln!(manifest, "    <item id=\"title-page\" href=\"title.xhtml\" media-type=\"application/xhtml+xml\"/>");
    let _ = writeln!(spine, "    <itemref idref=\"title-page\"/>");
    for chapter in chapters {
        let id = chapter_id(&chapter.file_name);
        let _ = writeln!(
            manifest,
            "    <item id=\"{id}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>",
            chapter.file_name
        );
        let _ = writeln!(spine, "    <itemref idref=\"{id}\"/>");
    }
    for (index, (file_name, image)) in images.iter().enumerate() {
        let _ = writeln!(
            manifest,
            "    <item id=\"img-{index}\" href=\"{IMAGES_DIR}/{}\" media-type=\"{}\"/>",
            escaped_attr(file_name),
            image.media_type
        );
    }

    let creator = if document.has_author() {
        format!("    <dc:creator>{}</dc:creator>\n", escaped(document.author))
    } else {
        String::new()
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\" unique-identifier=\"book-id\">\n\
  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n\
    <dc:identifier id=\"book-id\">{id}</dc:identifier>\n\
    <dc:title>{title}</dc:title>\n\
{creator}\
    <dc:language>en</dc:language>\n\
    <meta property=\"dcterms:modified\">{modified}</meta>\n\
  </metadata>\n\
  <manifest>\n{manifest}  </manifest>\n\
  <spine toc=\"ncx\">\n{spine}  </spine>\n\
</package>\n",
        id = book_id(document),
        title = escaped(document.title),
    )
}

fn nav_xhtml(chapters: &[Chapter]) -> String {
    let mut items = String::new();
    for chapter in chapters {
        let _ = writeln!(
            items,
            "      <li><a href=\"{}\">{}</a></li>",
            chapter.file_name,
            escaped(&chapter.title)
        );
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<!DOCTYPE html>\n\
<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"en\">\n\
<head><title>Contents</title></head>\n\
<body>\n\
  <nav epub:type=\"toc\" id=\"toc\">\n\
    <h1>Contents</h1>\n\
    <ol>\n{items}    </ol>\n\
  </nav>\n\
</body>\n\
</html>\n"
    )
}

fn toc_ncx(document: &Document<'_>, chapters: &[Chapter]) -> String {
    let mut points = String::new();
    for (index, chapter) in chapters.iter().enumerate() {
        let order = index + 1;
        let _ = writeln!(
            points,
            "    <navPoint id=\"nav-{order}\" playOrder=\"{order}\">\n\
      <navLabel><text>{}</text></navLabel>\n\
      <content src=\"{}\"/>\n\
    </navPoint>",
            escaped(&chapter.title),
            chapter.file_name
        );
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n\
  <head><meta name=\"dtb:uid\" content=\"{id}\"/></head>\n\
  <docTitle><text>{title}</text></docTitle>\n\
  <navMap>\n{points}  </navMap>\n\
</ncx>\n",
        id = book_id(document),
        title = escaped(document.title),
    )
}
