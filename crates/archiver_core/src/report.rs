use crate::{FailureKind, Post, PostStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRow {
    pub title: String,
    pub link: String,
    pub kind: FailureKind,
    pub cause: String,
}

/// Per-run tallies for display by an outer collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    pub total: usize,
    pub fetched: usize,
    pub degraded: usize,
    pub failed: usize,
    pub failures: Vec<FailureRow>,
    pub media_failures: usize,
}

impl RunReport {
    pub fn from_posts(posts: &[Post]) -> Self {
        let mut report = RunReport {
            total: posts.len(),
            ..Default::default()
        };
        for post in posts {
            report.media_failures += post.media_failures.len();
            match &post.status {
                PostStatus::Fetched => report.fetched += 1,
                PostStatus::Degraded { .. } => report.degraded += 1,
                PostStatus::Failed(record) => {
                    report.failed += 1;
                    report.failures.push(FailureRow {
                        title: post.summary.title.clone(),
                        link: post.summary.link.clone(),
                        kind: record.kind.clone(),
                        cause: record.cause.clone(),
                    });
                }
            }
        }
        report
    }

    pub fn included(&self) -> usize {
        self.fetched + self.degraded
    }
}
