use archiver_logging::{archiver_debug, archiver_warn};
use reqwest::StatusCode;
use scraper::{Html, Selector};
use url::{Host, Url};

use crate::decode::decode_body;
use crate::HttpSession;

pub const DEFAULT_NEWSLETTER_TITLE: &str = "Substack Archive";
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsletterInfo {
    pub title: String,
    pub author: String,
}

/// Title and author from the newsletter home page. Never fails; falls back to
/// defaults when the page cannot be fetched or lacks the metadata.
pub async fn newsletter_info(session: &HttpSession, source: &Url) -> NewsletterInfo {
    let html = match session.get_bytes(source.as_str(), &[]).await {
        Ok(output) => {
            match decode_body(&output.bytes, output.metadata.content_type.as_deref()) {
                Ok(html) => html,
                Err(err) => {
                    archiver_warn!("Newsletter home page decoded lossily: {err}");
                    String::from_utf8_lossy(&output.bytes).into_owned()
                }
            }
        }
        Err(err) => {
            archiver_warn!("Could not fetch newsletter home page {source}: {err}");
            String::new()
        }
    };
    parse_newsletter_info(&html, source)
}

pub fn parse_newsletter_info(html: &str, source: &Url) -> NewsletterInfo {
    let document = Html::parse_document(html);

    let title = select_text(&document, "title")
        .unwrap_or_else(|| DEFAULT_NEWSLETTER_TITLE.to_string());

    let author = select_attr(&document, "meta[name=\"author\"]", "content")
        .or_else(|| select_attr(&document, "meta[property=\"article:publisher\"]", "content"))
        .or_else(|| select_text(&document, "a[class*=\"author\" i]"))
        .or_else(|| author_from_subdomain(source))
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    archiver_debug!("Newsletter info for {source}: '{title}' by '{author}'");
    NewsletterInfo { title, author }
}

/// Check whether the session credential is accepted: true only on HTTP 200.
pub async fn verify_session(session: &HttpSession, auth_check_url: &str) -> bool {
    if !session.is_authenticated() {
        return false;
    }
    match session.open(auth_check_url).await {
        Ok(response) => response.status() == StatusCode::OK,
        Err(err) => {
            archiver_debug!("Session check against {auth_check_url} failed: {err}");
            false
        }
    }
}

fn select_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|text| !text.is_empty())
}

fn select_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn author_from_subdomain(source: &Url) -> Option<String> {
    let Some(Host::Domain(domain)) = source.host() else {
        return None;
    };
    let (subdomain, _) = domain.split_once('.')?;
    if subdomain.is_empty() || subdomain == "www" {
        return None;
    }
    let words: Vec<String> = subdomain
        .split('-')
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
