#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archiver_core::{ArchiverConfig, PostSummary};
use archiver_engine::{HttpSession, Progress, ProgressSink};
use chrono::{TimeZone, Utc};

/// Config with millisecond delays so retry paths run quickly.
pub fn fast_config(root: &Path) -> ArchiverConfig {
    archiver_logging::initialize_for_tests();
    ArchiverConfig {
        request_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        base_retry_delay: Duration::from_millis(1),
        max_retry_delay: Duration::from_millis(5),
        rate_limit_delay: Duration::ZERO,
        cache_dir: root.join("cache"),
        output_dir: root.join("out"),
        ..ArchiverConfig::default()
    }
}

pub fn session(config: &ArchiverConfig) -> HttpSession {
    HttpSession::from_config(config, None).unwrap()
}

pub fn summary(base: &str, slug: &str, day: u32) -> PostSummary {
    PostSummary {
        title: format!("Post {slug}"),
        link: format!("{base}/p/{slug}"),
        pub_date: Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap(),
        description: format!("About {slug}"),
    }
}

/// A post page in the platform's markup, including chrome the sanitizer removes.
pub fn post_page(title: &str, body: &str) -> String {
    format!(
        r#"<html><head><title>{title}</title></head><body>
<nav>Menu</nav>
<article>
<div class="available-content"><h1>{title}</h1>{body}
<div class="subscription-widget-wrap"><p>Subscribe now</p></div>
<button>Share</button>
</div>
</article>
</body></html>"#
    )
}

#[derive(Default, Clone)]
pub struct TestSink {
    events: Arc<Mutex<Vec<Progress>>>,
}

impl TestSink {
    pub fn take(&self) -> Vec<Progress> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl ProgressSink for TestSink {
    fn emit(&self, progress: Progress) {
        self.events.lock().unwrap().push(progress);
    }
}
