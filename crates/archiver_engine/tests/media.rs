mod common;

use std::fs;

use archiver_core::{CleanContent, Post};
use archiver_engine::{normalize_html, rewrite_videos, write_stream, MediaError, MediaResolver};
use futures_util::stream;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{fast_config, session, summary};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-image-bytes";

fn post_with(base: &str, html: &str) -> Post {
    Post::from_clean(
        summary(base, "pictures", 3),
        CleanContent {
            content: normalize_html(html),
            degradation: None,
        },
    )
}

fn dir_entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn interrupted_streams_leave_no_file() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("images").join("broken.png");
    let chunks: Vec<Result<Vec<u8>, String>> = vec![
        Ok(b"first".to_vec()),
        Ok(b"second".to_vec()),
        Err("connection reset".to_string()),
    ];

    let err = write_stream(stream::iter(chunks), &target, 1024)
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::Stream(_)), "{err:?}");
    assert!(!target.exists());
    assert!(dir_entries(&temp.path().join("images")).is_empty());
}

#[tokio::test]
async fn oversized_streams_are_discarded() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("big.bin");
    let chunks: Vec<Result<Vec<u8>, String>> = vec![Ok(vec![1; 8]), Ok(vec![2; 8])];

    let err = write_stream(stream::iter(chunks), &target, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, MediaError::TooLarge { max_bytes: 10, .. }));
    assert!(!target.exists());
}

#[tokio::test]
async fn complete_streams_are_persisted() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("ok.bin");
    let chunks: Vec<Result<&[u8], String>> = vec![Ok(&b"ab"[..]), Ok(&b"cd"[..])];

    let written = write_stream(stream::iter(chunks), &target, 10).await.unwrap();
    assert_eq!(written, 4);
    assert_eq!(fs::read(&target).unwrap(), b"abcd");
}

#[tokio::test]
async fn images_are_downloaded_and_references_rewritten() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/img/chart.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PNG.to_vec(), "image/png"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/missing.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());
    let images = temp.path().join("book").join("images");
    let resolver = MediaResolver::new(session(&config), &config).with_images_dir(images.clone());

    let html = format!(
        r#"<p>Intro</p><img src="{base}/img/chart.png" alt="Chart"><p>Middle</p><img src="/img/missing.jpg" alt="Gone"><img src="data:image/gif;base64,R0lGOD" alt="inline">"#
    );
    let post = resolver.resolve_media(post_with(&base, &html)).await;

    assert_eq!(post.media.len(), 1);
    let media = &post.media[0];
    assert!(media.file_name.ends_with(".png"));
    assert_eq!(media.media_type, "image/png");
    assert_eq!(fs::read(&media.local_path).unwrap(), PNG);
    assert_eq!(dir_entries(&images), vec![media.file_name.clone()]);

    let html = &post.content.html;
    assert!(html.contains(&format!("images/{}", media.file_name)), "{html}");
    assert!(!html.contains("missing.jpg"), "{html}");
    assert!(html.contains("data:image/gif"), "{html}");
    assert!(html.contains("Middle"));

    assert_eq!(post.media_failures.len(), 1);
    assert!(post.media_failures[0].contains("missing.jpg"));
}

#[tokio::test]
async fn posts_without_images_pass_through() {
    let temp = TempDir::new().unwrap();
    let config = fast_config(temp.path());
    let resolver = MediaResolver::new(session(&config), &config);
    let post = post_with("https://x.test", "<p>Words only</p>");
    let resolved = resolver.resolve_media(post.clone()).await;
    assert_eq!(resolved, post);
    assert!(!resolver.images_dir().exists());
}

#[test]
fn video_elements_become_links() {
    let base = Url::parse("https://news.substack.com/p/clip").unwrap();
    let html = r#"<p>Before</p><video controls><source src="/clip.webm" type="video/webm"><source src="/api/v1/video/upload/clip.mp4" type="video/mp4"></video>"#;
    let out = rewrite_videos(html, Some(&base));
    assert!(out.contains(r#"href="https://news.substack.com/api/v1/video/upload/clip.mp4""#), "{out}");
    assert!(out.contains("Click to watch Substack video"));
    assert!(out.contains("May require login"));
    assert!(!out.contains("<video"));
    assert!(out.contains("Before"));

    let plain = rewrite_videos(r#"<video src="https://cdn.test/v.mov"></video>"#, None);
    assert!(plain.contains("Click to watch video"), "{plain}");

    let missing = rewrite_videos("<video></video>", None);
    assert!(missing.contains("Video content (URL not available)"));
}

#[test]
fn platform_iframes_become_links_and_others_stay() {
    let html = r#"<iframe src="https://www.youtube.com/embed/abc123?rel=0"></iframe><iframe src="https://player.vimeo.com/video/42"></iframe><iframe src="https://maps.test/embed"></iframe>"#;
    let out = rewrite_videos(html, None);
    assert!(out.contains("Watch on YouTube"), "{out}");
    assert!(out.contains("https://www.youtube.com/watch?v=abc123"));
    assert!(out.contains("Watch on Vimeo"));
    assert!(out.contains("https://maps.test/embed"));
}
