use archiver_core::{ContentBlock, NormalizedContent};
use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Build the block view of already-cleaned markup.
pub fn normalize_html(html: &str) -> NormalizedContent {
    NormalizedContent {
        html: html.to_string(),
        blocks: build_blocks(html),
    }
}

pub fn build_blocks(html: &str) -> Vec<ContentBlock> {
    let fragment = Html::parse_fragment(html);
    let mut ctx = BlockContext::default();
    for child in fragment.root_element().children() {
        visit_node(child, &mut ctx);
    }
    ctx.into_blocks()
}

fn visit_node(node: NodeRef<'_, Node>, ctx: &mut BlockContext) {
    match node.value() {
        Node::Text(text) => ctx.append_text(text),
        Node::Element(_) => {
            if let Some(element) = ElementRef::wrap(node) {
                visit_element(element, ctx);
            }
        }
        _ => {
            for child in node.children() {
                visit_node(child, ctx);
            }
        }
    }
}

fn visit_element(element: ElementRef<'_>, ctx: &mut BlockContext) {
    let tag = element.value().name().to_ascii_lowercase();
    match tag.as_str() {
        "br" => ctx.push_break(),
        "hr" => {
            ctx.flush();
            ctx.blocks.push(ContentBlock::Rule);
        }
        "img" => {
            let src = element.value().attr("src").map(str::trim).unwrap_or_default();
            if !src.is_empty() {
                ctx.flush();
                ctx.blocks.push(ContentBlock::Image {
                    src: src.to_string(),
                    alt: element.value().attr("alt").unwrap_or_default().trim().to_string(),
                });
            }
        }
        "pre" => {
            ctx.flush();
            let text: String = element.text().collect();
            let text = text.trim_matches('\n').to_string();
            if !text.trim().is_empty() {
                ctx.blocks.push(ContentBlock::Preformatted { text });
            }
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = tag[1..].parse().unwrap_or(1);
            container(element, BlockKind::Heading(level), ctx);
        }
        "li" => container(element, BlockKind::ListItem, ctx),
        "blockquote" => container(element, BlockKind::Quote, ctx),
        "script" | "style" | "noscript" | "template" | "iframe" | "video" => {}
        "p" | "div" | "section" | "article" | "header" | "footer" | "figure" | "figcaption"
        | "table" | "tr" | "td" | "th" | "address" | "ul" | "ol" | "main" => {
            ctx.flush();
            visit_children(element, ctx);
            ctx.flush();
        }
        _ => visit_children(element, ctx),
    }
}

fn container(element: ElementRef<'_>, kind: BlockKind, ctx: &mut BlockContext) {
    ctx.flush();
    ctx.kinds.push(kind);
    visit_children(element, ctx);
    ctx.flush();
    ctx.kinds.pop();
}

fn visit_children(element: ElementRef<'_>, ctx: &mut BlockContext) {
    for child in element.children() {
        visit_node(child, ctx);
    }
}

#[derive(Debug, Clone, Copy)]
enum BlockKind {
    Heading(u8),
    ListItem,
    Quote,
}

#[derive(Default)]
struct BlockContext {
    blocks: Vec<ContentBlock>,
    text: String,
    kinds: Vec<BlockKind>,
    last_char: Option<char>,
}

impl BlockContext {
    fn append_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() && ch != '\u{a0}' {
                if matches!(self.last_char, None | Some(' ') | Some('\n')) {
                    continue;
                }
                self.push_char(' ');
            } else {
                self.push_char(ch);
            }
        }
    }

    fn push_break(&mut self) {
        if self.text.ends_with(' ') {
            self.text.pop();
        }
        if !self.text.is_empty() {
            self.push_char('\n');
        }
    }

    fn push_char(&mut self, ch: char) {
        self.text.push(ch);
        self.last_char = Some(ch);
    }

    /// Close the pending run of inline text as a block of the innermost kind.
    fn flush(&mut self) {
        let text = self
            .text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        self.text.clear();
        self.last_char = None;
        if text.is_empty() {
            return;
        }
        let block = match self.kinds.last() {
            Some(BlockKind::Heading(level)) => ContentBlock::Heading {
                level: *level,
                text,
            },
            Some(BlockKind::ListItem) => ContentBlock::ListItem { text },
            Some(BlockKind::Quote) => ContentBlock::Quote { text },
            None => ContentBlock::Paragraph { text },
        };
        self.blocks.push(block);
    }

    fn into_blocks(mut self) -> Vec<ContentBlock> {
        self.flush();
        self.blocks
    }
}
