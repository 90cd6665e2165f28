use archiver_core::{CleanContent, NormalizedContent};
use archiver_logging::{archiver_debug, archiver_warn};
use scraper::{ElementRef, Html, Selector};

use crate::content::normalize_html;
use crate::rewrite::{serialize_children, Rewrite};

/// Content-region selectors, most specific first. The first region that
/// yields at least one content block wins.
pub const CONTENT_SELECTORS: &[&str] = &[
    "div.available-content",
    "div.body.markup",
    "article",
    "div.post-content",
    "main",
    "body",
];

/// Index into [`CONTENT_SELECTORS`] from which a match counts as degraded.
pub const DEGRADATION_THRESHOLD: usize = 2;

/// Non-content fragments, matched by structure rather than by their wording.
pub const REMOVAL_PATTERNS: &[&str] = &[
    "script",
    "style",
    "noscript",
    "template",
    ".subscription-widget-wrap",
    ".share-dialog",
    ".share-button",
    ".post-footer",
    ".comments-section",
    ".subscribe-footer",
    "div[class*=\"subscribe\"]",
    "div[class*=\"share\"]",
    "button",
    "a[class*=\"button\"]",
    "a[href*=\"/subscribe\"]",
];

pub struct Sanitizer {
    regions: Vec<(&'static str, Selector)>,
    removals: Vec<Selector>,
    degradation_threshold: usize,
}

impl Sanitizer {
    pub fn new() -> Self {
        Self::with_rules(CONTENT_SELECTORS, REMOVAL_PATTERNS, DEGRADATION_THRESHOLD)
    }

    /// Custom chain; selectors that fail to parse are skipped with a warning.
    pub fn with_rules(
        regions: &[&'static str],
        removals: &[&'static str],
        degradation_threshold: usize,
    ) -> Self {
        Self {
            regions: regions
                .iter()
                .filter_map(|css| parse_selector(css).map(|sel| (*css, sel)))
                .collect(),
            removals: removals.iter().filter_map(|css| parse_selector(css)).collect(),
            degradation_threshold,
        }
    }

    /// Extract the article region of a post page and normalize it.
    ///
    /// Never fails: a page where no region yields content comes back empty and
    /// marked degraded.
    pub fn clean(&self, raw_html: &str) -> CleanContent {
        let document = Html::parse_document(raw_html);

        for (index, (css, selector)) in self.regions.iter().enumerate() {
            let Some(region) = document.select(selector).next() else {
                continue;
            };
            let content = normalize_html(self.clean_region(region).trim());
            if content.blocks.is_empty() {
                continue;
            }

            archiver_debug!("Content region matched `{css}` (position {index})");
            let degradation = (index >= self.degradation_threshold).then(|| {
                archiver_warn!(
                    "Content region fell back to `{css}`; page markup may have changed"
                );
                format!("content region fell back to `{css}`")
            });
            return CleanContent {
                content,
                degradation,
            };
        }

        archiver_warn!("No content region yielded any text");
        CleanContent {
            content: NormalizedContent::default(),
            degradation: Some("no content region yielded any text".to_string()),
        }
    }

    fn clean_region(&self, region: ElementRef<'_>) -> String {
        serialize_children(*region, &mut |element| {
            if self.removals.iter().any(|sel| sel.matches(&element)) {
                Rewrite::Drop
            } else {
                Rewrite::Keep
            }
        })
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(err) => {
            archiver_warn!("Ignoring invalid selector `{css}`: {err}");
            None
        }
    }
}
