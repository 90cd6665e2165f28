use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archiver_core::{
    advance, ArchiverConfig, CleanContent, FailureKind, FailureRecord, FetchOutcome, ItemDirective,
    ItemEvent, ItemState, Post, PostSummary, RetryPolicy,
};
use archiver_logging::{archiver_debug, archiver_info, archiver_warn};
use futures_util::future::join_all;
use thiserror::Error;

use crate::cache::{CacheError, ContentCache, DiskCache, NoCache};
use crate::decode::decode_body;
use crate::sanitize::Sanitizer;
use crate::http::Fetcher;
use crate::{FetchError, HttpSession, Progress, ProgressSink, Stage};

const HTML_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchAllError {
    #[error("max_workers must be at least 1 (got {0})")]
    InvalidWorkerCount(usize),
}

/// Final outcome of one item plus the terminal state it reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub outcome: FetchOutcome,
    pub state: ItemState,
}

impl ItemReport {
    pub fn attempts(&self) -> u32 {
        match &self.state {
            ItemState::Succeeded { attempts, .. } | ItemState::Failed { attempts, .. } => *attempts,
            ItemState::Fetching { attempt } => *attempt,
            ItemState::Retrying { retry } => *retry,
            ItemState::Pending => 0,
        }
    }

    pub fn into_post(self, summary: PostSummary) -> Post {
        let attempts = self.attempts();
        match self.outcome {
            FetchOutcome::Success(clean) => Post::from_clean(summary, clean),
            FetchOutcome::Failed { kind, cause } => Post::failed(
                summary,
                FailureRecord {
                    kind,
                    cause,
                    attempts,
                },
            ),
        }
    }
}

/// Fetches and sanitizes post bodies, consulting the cache it owns.
pub struct ContentFetcher {
    source: Arc<dyn Fetcher>,
    sanitizer: Sanitizer,
    cache: Arc<dyn ContentCache>,
    policy: RetryPolicy,
    rate_limit_delay: Duration,
}

impl ContentFetcher {
    /// Disk cache under `config.cache_dir` when caching is enabled.
    pub fn new(session: HttpSession, config: &ArchiverConfig) -> Self {
        let cache: Arc<dyn ContentCache> = if config.cache_enabled {
            archiver_info!("Content cache enabled at {}", config.cache_dir.display());
            Arc::new(DiskCache::new(config.cache_dir.clone()))
        } else {
            Arc::new(NoCache)
        };
        Self::with_cache(session, config, cache)
    }

    pub fn with_cache(
        session: HttpSession,
        config: &ArchiverConfig,
        cache: Arc<dyn ContentCache>,
    ) -> Self {
        Self::with_source(Arc::new(session), config, cache)
    }

    /// Fetcher over any page source, e.g. a recorded set of responses.
    pub fn with_source(
        source: Arc<dyn Fetcher>,
        config: &ArchiverConfig,
        cache: Arc<dyn ContentCache>,
    ) -> Self {
        Self {
            source,
            sanitizer: Sanitizer::new(),
            cache,
            policy: config.retry_policy(),
            rate_limit_delay: config.rate_limit_delay,
        }
    }

    pub fn cache(&self) -> &Arc<dyn ContentCache> {
        &self.cache
    }

    /// Purge every cached entry. In-flight fetches finish, but their results
    /// are not written back.
    pub fn clear_cache(&self) -> Result<usize, CacheError> {
        let removed = self.cache.clear()?;
        archiver_info!("Cleared {removed} cached posts");
        Ok(removed)
    }

    /// Fetch every summary with up to `max_workers` concurrent workers.
    ///
    /// The result has one post per summary, in input order. Individual
    /// failures become failed posts; only a worker count below one is an error.
    pub async fn fetch_all(
        &self,
        summaries: &[PostSummary],
        max_workers: usize,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<Post>, FetchAllError> {
        if max_workers < 1 {
            return Err(FetchAllError::InvalidWorkerCount(max_workers));
        }
        sink.emit(Progress::Stage(Stage::FetchingContent));

        let total = summaries.len();
        let workers = max_workers.min(total.max(1));
        archiver_info!("Fetching {total} posts with {workers} workers");

        let queue: Mutex<VecDeque<(usize, &PostSummary)>> =
            Mutex::new(summaries.iter().enumerate().collect());
        let finished = join_all((0..workers).map(|_| self.run_worker(&queue, total, sink))).await;

        let mut slots: Vec<Option<Post>> = (0..total).map(|_| None).collect();
        for (index, post) in finished.into_iter().flatten() {
            slots[index] = Some(post);
        }

        let posts: Vec<Post> = slots
            .into_iter()
            .zip(summaries)
            .map(|(slot, summary)| {
                slot.unwrap_or_else(|| {
                    Post::failed(
                        summary.clone(),
                        FailureRecord {
                            kind: FailureKind::Network,
                            cause: "post was never dispatched".to_string(),
                            attempts: 0,
                        },
                    )
                })
            })
            .collect();

        let failed = posts.iter().filter(|post| !post.is_included()).count();
        archiver_info!("Fetched {} posts, {failed} failed", total - failed);
        Ok(posts)
    }

    async fn run_worker<'a>(
        &self,
        queue: &Mutex<VecDeque<(usize, &'a PostSummary)>>,
        total: usize,
        sink: &dyn ProgressSink,
    ) -> Vec<(usize, Post)> {
        let mut done = Vec::new();
        loop {
            let next = match queue.lock() {
                Ok(mut pending) => pending.pop_front(),
                Err(poisoned) => poisoned.into_inner().pop_front(),
            };
            let Some((index, summary)) = next else {
                break;
            };
            if !done.is_empty() {
                tokio::time::sleep(self.rate_limit_delay).await;
            }

            let observe = |state: &ItemState| {
                sink.emit(Progress::Post {
                    index,
                    total,
                    title: summary.title.clone(),
                    state: state.clone(),
                })
            };
            let report = self.fetch_one(&summary.link, &observe).await;
            done.push((index, report.into_post(summary.clone())));
        }
        done
    }

    /// Drive one link through the fetch state machine to a terminal state.
    pub async fn fetch_one(
        &self,
        link: &str,
        observe: &(dyn Fn(&ItemState) + Sync),
    ) -> ItemReport {
        let generation = self.cache.generation();
        let mut state = ItemState::Pending;
        let mut event = ItemEvent::Dispatched;
        let mut content: Option<CleanContent> = None;
        let mut last_cause = String::new();

        loop {
            let (next, directive) = advance(state, event, &self.policy);
            state = next;
            observe(&state);

            event = match directive {
                ItemDirective::LookupCache => match self.cache.get(link) {
                    Some(cached) => {
                        archiver_debug!("Cache hit for {link}");
                        content = Some(cached);
                        ItemEvent::CacheHit
                    }
                    None => ItemEvent::CacheMiss,
                },
                ItemDirective::Request => match self.request(link).await {
                    Ok(clean) => {
                        self.cache.put(link, &clean, generation);
                        content = Some(clean);
                        ItemEvent::ResponseReady
                    }
                    Err(err) => {
                        archiver_debug!("Fetch of {link} failed: {err}");
                        last_cause = err.message;
                        ItemEvent::AttemptFailed(err.kind)
                    }
                },
                ItemDirective::Wait(delay) => {
                    if let ItemState::Retrying { retry } = &state {
                        archiver_warn!(
                            "Retrying {link} ({retry}/{}) in {delay:?}: {last_cause}",
                            self.policy.max_retries
                        );
                    }
                    tokio::time::sleep(delay).await;
                    ItemEvent::BackoffElapsed
                }
                ItemDirective::Finish | ItemDirective::Ignore => break,
            };
        }

        let outcome = match (&state, content) {
            (ItemState::Succeeded { .. }, Some(clean)) => FetchOutcome::Success(clean),
            (ItemState::Failed { kind, attempts }, _) => {
                archiver_warn!("Giving up on {link} after {attempts} attempts: {kind}");
                FetchOutcome::Failed {
                    kind: kind.clone(),
                    cause: last_cause,
                }
            }
            (other, _) => FetchOutcome::Failed {
                kind: FailureKind::Network,
                cause: format!("fetch stopped in state {other:?}"),
            },
        };
        ItemReport { outcome, state }
    }

    async fn request(&self, link: &str) -> Result<CleanContent, FetchError> {
        let output = self.source.fetch(link, HTML_CONTENT_TYPES).await?;
        let html = decode_body(&output.bytes, output.metadata.content_type.as_deref())?;
        Ok(self.sanitizer.clean(&html))
    }
}
