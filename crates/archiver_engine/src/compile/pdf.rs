use std::io::BufWriter;

use archiver_core::ContentBlock;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};

use super::{display_date, Document};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const BODY_SIZE: f32 = 10.0;
const PT_TO_MM: f32 = 0.3528;
/// Average Helvetica glyph width as a fraction of the font size.
const AVG_GLYPH_WIDTH: f32 = 0.5;

/// Map text onto the Latin-1 range the built-in PDF fonts can draw.
///
/// Typographic quotes, dashes, ellipses and non-breaking spaces become their
/// ASCII equivalents; anything else outside Latin-1 becomes `?`.
pub fn to_latin1(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{2032}' => out.push('\''),
            '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{2033}' => out.push('"'),
            '\u{2013}' | '\u{2212}' => out.push('-'),
            '\u{2014}' | '\u{2015}' => out.push_str("--"),
            '\u{2026}' => out.push_str("..."),
            '\u{a0}' | '\u{2009}' | '\u{200a}' | '\u{202f}' => out.push(' '),
            '\u{2022}' => out.push('*'),
            '\u{200b}' | '\u{feff}' => {}
            c if (c as u32) < 0x100 => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
    mono: IndirectFontRef,
}

/// Flowing text layout over fixed A4 pages.
struct Layout<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl Layout<'_> {
    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn line(&mut self, text: &str, size: f32, indent: f32, font: &IndirectFontRef) {
        let height = size * PT_TO_MM * 1.4;
        if self.y - height < MARGIN {
            self.new_page();
        }
        self.y -= height;
        self.layer
            .use_text(to_latin1(text), size, Mm(MARGIN + indent), Mm(self.y), font);
    }

    fn paragraph(&mut self, text: &str, size: f32, indent: f32, font: &IndirectFontRef) {
        let width = PAGE_WIDTH - 2.0 * MARGIN - indent;
        let max_chars = (width / (size * PT_TO_MM * AVG_GLYPH_WIDTH)).max(10.0) as usize;
        for source_line in text.lines() {
            for line in wrap(source_line, max_chars) {
                self.line(&line, size, indent, font);
            }
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }
}

pub(super) fn render(document: &Document<'_>) -> Result<Vec<u8>, String> {
    let title = to_latin1(document.title);
    let (doc, page, layer) =
        PdfDocument::new(title.as_str(), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let font = |builtin| doc.add_builtin_font(builtin).map_err(|err| err.to_string());
    let fonts = Fonts {
        regular: font(BuiltinFont::Helvetica)?,
        bold: font(BuiltinFont::HelveticaBold)?,
        italic: font(BuiltinFont::HelveticaOblique)?,
        mono: font(BuiltinFont::Courier)?,
    };

    let mut layout = Layout {
        doc: &doc,
        layer: doc.get_page(page).get_layer(layer),
        y: PAGE_HEIGHT - MARGIN,
    };

    layout.gap(60.0);
    layout.paragraph(document.title, 24.0, 0.0, &fonts.bold);
    if document.has_author() {
        layout.gap(4.0);
        layout.paragraph(&format!("By {}", document.author), 14.0, 0.0, &fonts.italic);
    }
    layout.gap(10.0);
    layout.line("Contents", 14.0, 0.0, &fonts.bold);
    for (index, post) in document.posts.iter().enumerate() {
        let entry = format!("{}. {} ({})", index + 1, post.summary.title, display_date(post));
        layout.paragraph(&entry, BODY_SIZE, 4.0, &fonts.regular);
    }

    for post in document.posts {
        layout.new_page();
        layout.paragraph(&post.summary.title, 16.0, 0.0, &fonts.bold);
        layout.line(&display_date(post), 9.0, 0.0, &fonts.italic);
        layout.gap(4.0);
        for block in &post.content.blocks {
            render_block(&mut layout, block, &fonts);
        }
    }

    let mut writer = BufWriter::new(Vec::new());
    doc.save(&mut writer).map_err(|err| err.to_string())?;
    writer.into_inner().map_err(|err| err.to_string())
}

fn render_block(layout: &mut Layout<'_>, block: &ContentBlock, fonts: &Fonts) {
    match block {
        ContentBlock::Heading { level, text } => {
            let size = match level {
                1 => 15.0,
                2 => 13.0,
                _ => 11.5,
            };
            layout.gap(2.0);
            layout.paragraph(text, size, 0.0, &fonts.bold);
        }
        ContentBlock::Paragraph { text } => layout.paragraph(text, BODY_SIZE, 0.0, &fonts.regular),
        ContentBlock::ListItem { text } => {
            layout.paragraph(&format!("- {text}"), BODY_SIZE, 4.0, &fonts.regular)
        }
        ContentBlock::Quote { text } => layout.paragraph(text, BODY_SIZE, 8.0, &fonts.italic),
        ContentBlock::Preformatted { text } => layout.paragraph(text, 8.5, 4.0, &fonts.mono),
        ContentBlock::Image { alt, .. } => {
            let label = if alt.is_empty() {
                "[Image]".to_string()
            } else {
                format!("[Image: {alt}]")
            };
            layout.paragraph(&label, 9.0, 0.0, &fonts.italic);
        }
        ContentBlock::Rule => layout.line("* * *", BODY_SIZE, 70.0, &fonts.regular),
    }
    layout.gap(2.0);
}

/// Greedy word wrap by character count; overlong words are split.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        let needed = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::{to_latin1, wrap};

    #[test]
    fn typographic_characters_become_ascii() {
        assert_eq!(
            to_latin1("\u{201c}Caf\u{e9}\u{201d} \u{2014} it\u{2019}s\u{2026} \u{1F600}"),
            "\"Caf\u{e9}\" -- it's... ?"
        );
    }

    #[test]
    fn wraps_on_word_boundaries() {
        assert_eq!(wrap("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert!(wrap("   ", 10).is_empty());
    }
}
