use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use archiver_core::{normalize_link, ArchiverConfig, PostSummary, RetryPolicy};
use archiver_logging::{archiver_debug, archiver_info, archiver_warn};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::retry::{with_retry, IsRetryable};
use crate::{FetchError, HttpSession, Progress, ProgressSink, Stage};

const ARCHIVE_PATH: &str = "api/v1/archive";
const DEFAULT_TITLE: &str = "No Title";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    #[error("archive source unreachable at {url}: {cause}")]
    SourceUnreachable { url: String, cause: String },
    #[error("malformed archive response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },
    #[error("refusing to send a session credential over plain http to {url}")]
    InsecureCredential { url: String },
    #[error("invalid archive source `{url}`: {reason}")]
    InvalidSource { url: String, reason: String },
}

/// Point-in-time listing of an archive, oldest post first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveSnapshot {
    pub summaries: Vec<PostSummary>,
    /// Non-fatal problems met while paging (skipped items, date fallbacks).
    pub warnings: Vec<String>,
}

/// Where the next page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    Offset(usize),
    Token(String),
}

/// One validated page of the archive listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePage {
    pub summaries: Vec<PostSummary>,
    /// Items in the raw page, including skipped ones.
    pub raw_len: usize,
    /// Absent on the last page.
    pub next: Option<PageCursor>,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
enum PageError {
    Fetch(FetchError),
    Malformed(String),
}

impl IsRetryable for PageError {
    fn is_retryable(&self) -> bool {
        match self {
            PageError::Fetch(err) => err.kind.is_retryable(),
            PageError::Malformed(_) => true,
        }
    }
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageError::Fetch(err) => write!(f, "{err}"),
            PageError::Malformed(reason) => write!(f, "malformed page: {reason}"),
        }
    }
}

pub struct ArchiveClient {
    session: HttpSession,
    base: Url,
    page_size: usize,
    page_retry: RetryPolicy,
    rate_limit_delay: Duration,
}

impl ArchiveClient {
    /// Validates the source URL; a session credential requires https.
    pub fn new(
        session: HttpSession,
        source: &str,
        config: &ArchiverConfig,
    ) -> Result<Self, ArchiveError> {
        let base = parse_source(source)?;
        if base.scheme() == "http" {
            if session.is_authenticated() {
                return Err(ArchiveError::InsecureCredential {
                    url: source.to_string(),
                });
            }
            archiver_warn!("Using plain http for {source}; the connection is not encrypted");
        }
        Ok(Self {
            session,
            base,
            page_size: config.page_size.max(1),
            page_retry: config.page_retry_policy(),
            rate_limit_delay: config.rate_limit_delay,
        })
    }

    /// Source URL without a trailing slash.
    pub fn source(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Page through the archive until the cursor runs out or `limit` unique
    /// posts are collected. The listing is newest-first, so a limit keeps the
    /// most recent posts; the result is returned oldest-first.
    pub async fn fetch_archive(
        &self,
        limit: Option<usize>,
        sink: &dyn ProgressSink,
    ) -> Result<ArchiveSnapshot, ArchiveError> {
        sink.emit(Progress::Stage(Stage::ListingArchive));
        archiver_info!("Fetching archive from {}", self.api_base());

        let mut snapshot = ArchiveSnapshot::default();
        if limit == Some(0) {
            return Ok(snapshot);
        }

        let mut seen = HashSet::new();
        let mut tokens_seen = HashSet::new();
        let mut cursor = PageCursor::Offset(0);
        let mut pages_ok = 0usize;

        'pages: loop {
            let page_url = self.page_url(&cursor);
            let label = format!("archive page {page_url}");
            let page = match with_retry(&self.page_retry, &label, || self.fetch_page(&page_url))
                .await
            {
                Ok(page) => page,
                Err((PageError::Malformed(reason), _)) if pages_ok > 0 => {
                    let warning =
                        format!("stopped paging after {pages_ok} pages: {reason}");
                    archiver_warn!("Archive at {}: {warning}", self.source());
                    snapshot.warnings.push(warning);
                    break;
                }
                Err((PageError::Malformed(reason), _)) => {
                    return Err(ArchiveError::MalformedResponse {
                        url: page_url,
                        reason,
                    });
                }
                Err((PageError::Fetch(err), attempts)) => {
                    return Err(ArchiveError::SourceUnreachable {
                        url: page_url,
                        cause: format!("{err} after {attempts} attempts"),
                    });
                }
            };
            pages_ok += 1;

            for warning in &page.warnings {
                archiver_warn!("{warning}");
            }
            snapshot.warnings.extend(page.warnings);

            let mut added = 0usize;
            for summary in page.summaries {
                if !seen.insert(normalize_link(&summary.link)) {
                    archiver_debug!("Skipping duplicate archive entry {}", summary.link);
                    continue;
                }
                snapshot.summaries.push(summary);
                added += 1;
                sink.emit(Progress::ArchiveCollected {
                    collected: snapshot.summaries.len(),
                    limit,
                });
                if limit.is_some_and(|limit| snapshot.summaries.len() >= limit) {
                    break 'pages;
                }
            }

            let stall = match &page.next {
                None => break,
                Some(_) if added == 0 => Some("page added no new posts".to_string()),
                Some(PageCursor::Token(token)) if !tokens_seen.insert(token.clone()) => {
                    Some(format!("cursor {token:?} repeated"))
                }
                Some(_) => None,
            };
            if let Some(reason) = stall {
                let warning = format!("stopped paging after {pages_ok} pages: {reason}");
                archiver_warn!("Archive at {}: {warning}", self.source());
                snapshot.warnings.push(warning);
                break;
            }
            if let Some(next) = page.next {
                cursor = next;
            }
            tokio::time::sleep(self.rate_limit_delay).await;
        }

        snapshot.summaries.sort_by_key(|summary| summary.pub_date);
        archiver_info!(
            "Found {} posts in archive of {}",
            snapshot.summaries.len(),
            self.source()
        );
        Ok(snapshot)
    }

    async fn fetch_page(&self, page_url: &str) -> Result<ArchivePage, PageError> {
        let output = self
            .session
            .get_bytes(page_url, &[])
            .await
            .map_err(PageError::Fetch)?;
        let offset = current_offset(page_url);
        parse_page(&output.bytes, offset, self.page_size).map_err(PageError::Malformed)
    }

    fn api_base(&self) -> String {
        format!("{}/{ARCHIVE_PATH}", self.source())
    }

    fn page_url(&self, cursor: &PageCursor) -> String {
        let mut url = match Url::parse(&self.api_base()) {
            Ok(url) => url,
            Err(_) => self.base.clone(),
        };
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("sort", "new").append_pair("search", "");
            match cursor {
                PageCursor::Offset(offset) => {
                    query.append_pair("offset", &offset.to_string());
                }
                PageCursor::Token(token) => {
                    query.append_pair("cursor", token);
                }
            }
            query.append_pair("limit", &self.page_size.to_string());
        }
        url.to_string()
    }
}

fn parse_source(source: &str) -> Result<Url, ArchiveError> {
    let invalid = |reason: &str| ArchiveError::InvalidSource {
        url: source.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(source.trim()).map_err(|err| invalid(&err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(url)
}

fn current_offset(page_url: &str) -> usize {
    Url::parse(page_url)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "offset")
                .and_then(|(_, value)| value.parse().ok())
        })
        .unwrap_or(0)
}

/// Validate one archive response body.
///
/// Accepts a bare array (offset paging) or an object with a `posts` array and
/// an optional `next_cursor`. Items that are not objects or lack
/// `canonical_url` are skipped with a warning.
pub fn parse_page(body: &[u8], offset: usize, page_size: usize) -> Result<ArchivePage, String> {
    let value: Value =
        serde_json::from_slice(body).map_err(|err| format!("invalid JSON: {err}"))?;

    let (items, next) = match value {
        Value::Array(items) => {
            let next = (items.len() >= page_size && !items.is_empty())
                .then(|| PageCursor::Offset(offset + items.len()));
            (items, next)
        }
        Value::Object(mut map) => {
            let items = match map.remove("posts") {
                Some(Value::Array(items)) => items,
                Some(other) => {
                    return Err(format!("`posts` is {}, expected an array", type_name(&other)))
                }
                None => return Err("object response has no `posts` list".to_string()),
            };
            let next = cursor_token(&map).map(PageCursor::Token);
            let next = if items.is_empty() { None } else { next };
            (items, next)
        }
        other => return Err(format!("response is {}, expected a list", type_name(&other))),
    };

    let raw_len = items.len();
    let mut summaries = Vec::with_capacity(raw_len);
    let mut warnings = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        match summary_from_item(item, offset + index) {
            Ok((summary, warning)) => {
                warnings.extend(warning);
                summaries.push(summary);
            }
            Err(warning) => warnings.push(warning),
        }
    }

    Ok(ArchivePage {
        summaries,
        raw_len,
        next,
        warnings,
    })
}

fn cursor_token(map: &Map<String, Value>) -> Option<String> {
    match map.get("next_cursor")? {
        Value::String(token) if !token.is_empty() => Some(token.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn summary_from_item(
    item: Value,
    position: usize,
) -> Result<(PostSummary, Option<String>), String> {
    let Value::Object(fields) = item else {
        return Err(format!(
            "skipped archive item {position}: expected an object, got {}",
            type_name(&item)
        ));
    };

    let link = fields
        .get("canonical_url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|link| !link.is_empty())
        .ok_or_else(|| format!("skipped archive item {position}: missing canonical_url"))?;

    let title = fields
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(DEFAULT_TITLE)
        .to_string();
    let description = fields
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let raw_date = fields.get("post_date").and_then(Value::as_str);
    let (pub_date, warning) = match raw_date.and_then(parse_post_date) {
        Some(date) => (date, None),
        None => (
            Utc::now(),
            Some(format!(
                "unparseable publish date {:?} for '{title}', using current time",
                raw_date.unwrap_or_default()
            )),
        ),
    };

    Ok((
        PostSummary {
            title,
            link: link.to_string(),
            pub_date,
            description,
        },
        warning,
    ))
}

fn parse_post_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
