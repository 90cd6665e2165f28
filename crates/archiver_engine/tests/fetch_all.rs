mod common;

use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use archiver_core::{
    CleanContent, ContentBlock, FailureKind, ItemState, NormalizedContent, PostStatus,
};
use archiver_engine::{
    ContentCache, ContentFetcher, DiskCache, FetchAllError, FetchError, FetchMetadata,
    FetchOutput, Fetcher, NoCache, NoProgress, Progress,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{fast_config, post_page, session, summary, TestSink};

const HTML: &str = "text/html; charset=utf-8";

async fn mount_post(server: &MockServer, slug: &str, delay_ms: u64) {
    let body = post_page(&format!("Post {slug}"), &format!("<p>Body of {slug}.</p>"));
    Mock::given(method("GET"))
        .and(path(format!("/p/{slug}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body.into_bytes(), HTML)
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn results_follow_input_order_for_any_worker_count() {
    let server = MockServer::start().await;
    let base = server.uri();
    let slugs = ["a", "b", "c", "d", "e"];
    // Earlier posts answer slower so completion order differs from input order.
    for (i, slug) in slugs.iter().enumerate() {
        mount_post(&server, slug, 60 - 12 * i as u64).await;
    }
    let summaries: Vec<_> = slugs
        .iter()
        .enumerate()
        .map(|(i, slug)| summary(&base, slug, i as u32 + 1))
        .collect();

    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());
    let fetcher = ContentFetcher::new(session(&config), &config);

    for workers in [1, 2, 3, 8] {
        let posts = fetcher
            .fetch_all(&summaries, workers, &NoProgress)
            .await
            .unwrap();
        assert_eq!(posts.len(), summaries.len(), "workers = {workers}");
        let links: Vec<&str> = posts.iter().map(|p| p.summary.link.as_str()).collect();
        let expected: Vec<&str> = summaries.iter().map(|s| s.link.as_str()).collect();
        assert_eq!(links, expected, "workers = {workers}");

        for (post, slug) in posts.iter().zip(slugs) {
            assert_eq!(post.status, PostStatus::Fetched);
            let text = post.content.plain_text();
            assert!(text.contains(&format!("Body of {slug}.")), "{text}");
            assert!(!text.contains("Subscribe now"));
            assert!(!post.content.html.contains("<button"));
        }
    }
}

#[tokio::test]
async fn empty_input_yields_empty_output() {
    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());
    let fetcher = ContentFetcher::new(session(&config), &config);
    let posts = fetcher.fetch_all(&[], 4, &NoProgress).await.unwrap();
    assert!(posts.is_empty());
}

#[tokio::test]
async fn zero_workers_is_rejected() {
    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());
    let fetcher = ContentFetcher::new(session(&config), &config);
    let err = fetcher
        .fetch_all(&[summary("https://x.test", "a", 1)], 0, &NoProgress)
        .await
        .unwrap_err();
    assert_eq!(err, FetchAllError::InvalidWorkerCount(0));
}

#[tokio::test]
async fn cached_posts_skip_the_network() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/p/cached"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(post_page("Cached", "<p>Stored once.</p>").into_bytes(), HTML),
        )
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let mut config = fast_config(temp.path());
    config.cache_enabled = true;
    let fetcher = ContentFetcher::new(session(&config), &config);
    let summaries = vec![summary(&base, "cached", 1)];

    let first = fetcher
        .fetch_all(&summaries, 1, &NoProgress)
        .await
        .unwrap();
    let sink = TestSink::default();
    let second = fetcher.fetch_all(&summaries, 1, &sink).await.unwrap();

    assert_eq!(first, second);
    let terminal = sink.take().into_iter().rev().find_map(|p| match p {
        Progress::Post { state, .. } if state.is_terminal() => Some(state),
        _ => None,
    });
    assert_eq!(
        terminal,
        Some(ItemState::Succeeded {
            attempts: 0,
            from_cache: true
        })
    );

    // A fetcher over the same directory sees the entry too.
    let reopened = ContentFetcher::new(session(&config), &config);
    let third = reopened
        .fetch_all(&summaries, 1, &NoProgress)
        .await
        .unwrap();
    assert_eq!(first, third);
}

#[tokio::test]
async fn retryable_failures_are_retried_until_the_limit() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/p/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let mut config = fast_config(temp.path());
    config.max_retries = 3;
    let fetcher = ContentFetcher::new(session(&config), &config);
    let sink = TestSink::default();

    let posts = fetcher
        .fetch_all(&[summary(&base, "flaky", 1)], 2, &sink)
        .await
        .unwrap();

    let record = posts[0].failure().expect("post should have failed");
    assert_eq!(record.kind, FailureKind::HttpStatus { status: 503 });
    assert_eq!(record.attempts, 4);

    let retries: Vec<u32> = sink
        .take()
        .into_iter()
        .filter_map(|p| match p {
            Progress::Post {
                state: ItemState::Retrying { retry },
                ..
            } => Some(retry),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![1, 2, 3]);
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/p/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    mount_post(&server, "fine", 0).await;

    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());
    let fetcher = ContentFetcher::new(session(&config), &config);

    let posts = fetcher
        .fetch_all(
            &[summary(&base, "gone", 1), summary(&base, "fine", 2)],
            2,
            &NoProgress,
        )
        .await
        .unwrap();
    assert_eq!(posts[0].failure().map(|f| f.attempts), Some(1));
    assert!(posts[1].is_included());
}

#[tokio::test]
async fn non_html_responses_fail_without_retry() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/p/binary"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 16], "application/pdf"))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());
    let fetcher = ContentFetcher::new(session(&config), &config);
    let report = fetcher
        .fetch_one(&format!("{base}/p/binary"), &|_| {})
        .await;
    assert!(matches!(
        report.state,
        ItemState::Failed {
            kind: FailureKind::UnsupportedContentType { .. },
            ..
        }
    ));
}

fn sample_content(text: &str) -> CleanContent {
    CleanContent {
        content: NormalizedContent {
            html: format!("<p>{text}</p>"),
            blocks: vec![ContentBlock::Paragraph {
                text: text.to_string(),
            }],
        },
        degradation: None,
    }
}

#[test]
fn clearing_the_cache_discards_stale_writes() {
    let temp = TempDir::new().unwrap();
    let cache = DiskCache::new(temp.path().join("cache"));
    let link = "https://x.test/p/one";

    let before = cache.generation();
    cache.put(link, &sample_content("one"), before);
    assert_eq!(cache.get(link), Some(sample_content("one")));

    assert_eq!(cache.clear().unwrap(), 1);
    assert_eq!(cache.get(link), None);

    // A fetch that started before the clear finishes afterwards.
    cache.put(link, &sample_content("stale"), before);
    assert_eq!(cache.get(link), None);

    cache.put(link, &sample_content("fresh"), cache.generation());
    assert_eq!(cache.get(link), Some(sample_content("fresh")));
}

#[test]
fn corrupt_entries_read_as_misses() {
    let temp = TempDir::new().unwrap();
    let cache = DiskCache::new(temp.path());
    let link = "https://x.test/p/broken";
    fs::write(cache.entry_path(link), b"{ not json").unwrap();
    assert_eq!(cache.get(link), None);

    cache.put(link, &sample_content("repaired"), cache.generation());
    assert_eq!(cache.get(link), Some(sample_content("repaired")));
}

#[test]
fn rewriting_an_entry_never_hides_it_from_readers() {
    let temp = TempDir::new().unwrap();
    let cache = DiskCache::new(temp.path().join("cache"));
    let link = "https://x.test/p/busy";
    cache.put(link, &sample_content("v0"), 0);

    let done = AtomicBool::new(false);
    let misses = std::thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut misses = 0u32;
            while !done.load(Ordering::SeqCst) {
                if cache.get(link).is_none() {
                    misses += 1;
                }
            }
            misses
        });
        for round in 0..500 {
            cache.put(link, &sample_content(&format!("v{round}")), 0);
        }
        done.store(true, Ordering::SeqCst);
        reader.join().unwrap()
    });

    assert_eq!(misses, 0);
    assert_eq!(cache.get(link), Some(sample_content("v499")));
    // Only the entry itself remains; no temp files are left behind.
    assert_eq!(fs::read_dir(cache.dir()).unwrap().count(), 1);
}

#[tokio::test]
async fn clear_cache_through_the_fetcher() {
    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());
    let cache = Arc::new(DiskCache::new(temp.path().join("shared")));
    cache.put("https://x.test/p/a", &sample_content("a"), 0);
    cache.put("https://x.test/p/b", &sample_content("b"), 0);

    let fetcher = ContentFetcher::with_cache(session(&config), &config, cache.clone());
    assert_eq!(fetcher.clear_cache().unwrap(), 2);
    assert_eq!(cache.generation(), 1);
    assert_eq!(fetcher.cache().get("https://x.test/p/a"), None);
}

/// Times out a fixed number of times, then serves a post page.
struct FlakySource {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait::async_trait]
impl Fetcher for FlakySource {
    async fn fetch(&self, url: &str, _allowed: &[&str]) -> Result<FetchOutput, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(FetchError {
                kind: FailureKind::Timeout,
                message: format!("call {call} timed out"),
            });
        }
        let bytes = post_page("Recovered", "<p>Eventually served.</p>").into_bytes();
        Ok(FetchOutput {
            metadata: FetchMetadata {
                requested_url: url.to_string(),
                final_url: url.to_string(),
                content_type: Some(HTML.to_string()),
                byte_len: bytes.len() as u64,
            },
            bytes,
        })
    }
}

#[tokio::test]
async fn transient_failures_recover_within_the_retry_budget() {
    let temp = TempDir::new().unwrap();
    let mut config = fast_config(temp.path());
    config.max_retries = 3;
    let source = Arc::new(FlakySource {
        failures: 2,
        calls: AtomicU32::new(0),
    });
    let fetcher = ContentFetcher::with_source(source.clone(), &config, Arc::new(NoCache));

    let report = fetcher.fetch_one("https://x.test/p/recovered", &|_| {}).await;
    assert_eq!(
        report.state,
        ItemState::Succeeded {
            attempts: 3,
            from_cache: false
        }
    );
    assert_eq!(report.attempts(), 3);
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}
