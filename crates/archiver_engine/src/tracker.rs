use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use archiver_core::{normalize_link, PostSummary};
use archiver_logging::{archiver_info, archiver_warn};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::persist::{AtomicFileWriter, PersistError};

/// Contents of `{stem}_tracker.json`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerRecord {
    pub title: String,
    pub author: String,
    #[serde(rename = "url")]
    pub source_url: String,
    pub post_links: Vec<String>,
    /// RFC 3339 timestamp of the last save; kept as text so older records still load.
    pub last_updated: Option<String>,
}

/// Remembers which posts an e-book already contains so later runs only append new ones.
#[derive(Debug, Clone)]
pub struct EpubTracker {
    epub_path: PathBuf,
    tracker_path: PathBuf,
    record: TrackerRecord,
}

impl EpubTracker {
    /// Load the tracker next to `epub_path`. A missing or unreadable file
    /// yields an empty record.
    pub fn load(epub_path: &Path) -> Self {
        let tracker_path = Self::tracker_path_for(epub_path);
        let record = match fs::read(&tracker_path) {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|err| {
                archiver_warn!(
                    "Ignoring corrupt tracker {}: {err}",
                    tracker_path.display()
                );
                TrackerRecord::default()
            }),
            Err(_) => TrackerRecord::default(),
        };
        Self {
            epub_path: epub_path.to_path_buf(),
            tracker_path,
            record,
        }
    }

    pub fn tracker_path_for(epub_path: &Path) -> PathBuf {
        let stem = epub_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        epub_path.with_file_name(format!("{stem}_tracker.json"))
    }

    /// True when both the e-book and its tracker are on disk.
    pub fn exists(epub_path: &Path) -> bool {
        epub_path.is_file() && Self::tracker_path_for(epub_path).is_file()
    }

    pub fn record(&self) -> &TrackerRecord {
        &self.record
    }

    pub fn tracker_path(&self) -> &Path {
        &self.tracker_path
    }

    pub fn epub_path(&self) -> &Path {
        &self.epub_path
    }

    /// Summaries whose links the e-book does not contain yet, order preserved.
    pub fn new_posts(&self, summaries: &[PostSummary]) -> Vec<PostSummary> {
        let known: HashSet<String> = self
            .record
            .post_links
            .iter()
            .map(|link| normalize_link(link))
            .collect();
        let fresh: Vec<PostSummary> = summaries
            .iter()
            .filter(|summary| !known.contains(&normalize_link(&summary.link)))
            .cloned()
            .collect();
        archiver_info!(
            "Total posts: {}, already included: {}, new: {}",
            summaries.len(),
            known.len(),
            fresh.len()
        );
        fresh
    }

    /// Append links to the record, skipping ones already present.
    pub fn track<'a>(&mut self, links: impl IntoIterator<Item = &'a str>) {
        let mut known: HashSet<String> = self
            .record
            .post_links
            .iter()
            .map(|link| normalize_link(link))
            .collect();
        for link in links {
            if known.insert(normalize_link(link)) {
                self.record.post_links.push(link.to_string());
            }
        }
    }

    pub fn set_metadata(&mut self, title: &str, author: &str, source_url: &str) {
        self.record.title = title.to_string();
        self.record.author = author.to_string();
        self.record.source_url = source_url.to_string();
    }

    pub fn save(&mut self) -> Result<PathBuf, PersistError> {
        self.record.last_updated = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        let bytes = serde_json::to_vec_pretty(&self.record)
            .map_err(|err| PersistError::Io(err.into()))?;
        let path = AtomicFileWriter.write_bytes(&self.tracker_path, &bytes)?;
        archiver_info!(
            "Tracker saved: {} posts tracked in {}",
            self.record.post_links.len(),
            path.display()
        );
        Ok(path)
    }
}
