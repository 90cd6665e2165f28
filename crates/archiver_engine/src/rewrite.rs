use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::ElementRef;

/// Per-element decision taken while serializing a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rewrite {
    Keep,
    Drop,
    /// Emit this markup in place of the element and its subtree.
    Replace(String),
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Serialize the children of `node` as XHTML-compatible markup.
///
/// Void elements are self-closed and text/attribute values are escaped, so the
/// output can be embedded in both HTML documents and EPUB chapters. Comments,
/// doctypes and processing instructions are dropped.
pub(crate) fn serialize_children<F>(node: NodeRef<'_, Node>, hook: &mut F) -> String
where
    F: FnMut(ElementRef<'_>) -> Rewrite,
{
    let mut out = String::new();
    for child in node.children() {
        write_node(child, hook, &mut out);
    }
    out
}

fn write_node<F>(node: NodeRef<'_, Node>, hook: &mut F, out: &mut String)
where
    F: FnMut(ElementRef<'_>) -> Rewrite,
{
    match node.value() {
        Node::Text(text) => escape_text(text, out),
        Node::Element(_) => {
            if let Some(element) = ElementRef::wrap(node) {
                match hook(element) {
                    Rewrite::Keep => write_element(element, hook, out),
                    Rewrite::Drop => {}
                    Rewrite::Replace(markup) => out.push_str(&markup),
                }
            }
        }
        Node::Document | Node::Fragment => {
            for child in node.children() {
                write_node(child, hook, out);
            }
        }
        _ => {}
    }
}

fn write_element<F>(element: ElementRef<'_>, hook: &mut F, out: &mut String)
where
    F: FnMut(ElementRef<'_>) -> Rewrite,
{
    let name = element.value().name().to_ascii_lowercase();
    let attrs: Vec<(&str, &str)> = element.value().attrs().collect();
    out.push_str(&open_tag(&name, &attrs, is_void(&name)));
    if is_void(&name) {
        return;
    }
    for child in element.children() {
        write_node(child, hook, out);
    }
    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

/// `<name a="b">`, or `<name a="b"/>` when `self_close` is set.
pub(crate) fn open_tag(name: &str, attrs: &[(&str, &str)], self_close: bool) -> String {
    let mut out = String::new();
    out.push('<');
    out.push_str(name);
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        escape_attr(value, &mut out);
        out.push('"');
    }
    out.push_str(if self_close { "/>" } else { ">" });
    out
}

pub(crate) fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

pub(crate) fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&#160;"),
            c => out.push(c),
        }
    }
}

pub(crate) fn escape_attr(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

pub(crate) fn escaped(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_text(text, &mut out);
    out
}

pub(crate) fn escaped_attr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_attr(text, &mut out);
    out
}
